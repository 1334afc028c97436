//! Simulated X-Rite SP instrument.
//!
//! Runs the device side of the X-Rite protocol over an in-memory duplex
//! stream so sessions can be exercised without hardware. All timing uses
//! `tokio::time`.
//!
//! # Behaviour
//!
//! - `IV` reports the configured identity
//! - `MS` before `CW` answers status 10 when calibration is required
//! - `RS` before any `MS` answers status 21
//! - replies can be dropped to exercise timeouts and retries
//!
//! ```rust,ignore
//! let (port, device) = XRiteSimulator::new().requires_calibration(true).spawn();
//! let session = Spectrophotometer::open("sim", Arc::new(XRiteDriver::default()), port, SessionOptions::default());
//! ```

use super::xrite::status_message;
use crate::colorimetry::Reflectance;
use crate::error::SpectroResult;
use crate::protocol::serial::DynSerial;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

const START_NM: f64 = 400.0;
const INTERVAL_NM: f64 = 10.0;
const SAMPLES: usize = 31;

/// What the simulator saw before the host hung up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatorLog {
    /// Received commands, terminator stripped, in arrival order.
    pub commands: Vec<String>,
    /// Replies deliberately withheld.
    pub dropped: usize,
}

impl SimulatorLog {
    /// How many times `command` (first word) was received.
    pub fn count(&self, command: &str) -> usize {
        self.commands
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(command))
            .count()
    }
}

/// Device-side X-Rite SP simulator.
#[derive(Debug, Clone)]
pub struct XRiteSimulator {
    reflectance: Option<Reflectance>,
    model: String,
    firmware: String,
    serial_number: String,
    require_calibration: bool,
    drop_replies: usize,
    silent: bool,
    measure_delay: Duration,
}

impl Default for XRiteSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl XRiteSimulator {
    /// Calibrated SP64 returning an orange sample.
    pub fn new() -> Self {
        Self {
            reflectance: None,
            model: "SP64".into(),
            firmware: "2.10".into(),
            serial_number: "SIM0001".into(),
            require_calibration: false,
            drop_replies: 0,
            silent: false,
            measure_delay: Duration::from_millis(5),
        }
    }

    /// Report this curve from `RS`.
    pub fn with_reflectance(mut self, reflectance: Reflectance) -> Self {
        self.reflectance = Some(reflectance);
        self
    }

    /// Report this identity from `IV`.
    pub fn with_identity(
        mut self,
        model: impl Into<String>,
        firmware: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        self.model = model.into();
        self.firmware = firmware.into();
        self.serial_number = serial_number.into();
        self
    }

    /// Refuse to measure until a white calibration has been done.
    pub fn requires_calibration(mut self, required: bool) -> Self {
        self.require_calibration = required;
        self
    }

    /// Withhold the next `count` replies.
    pub fn drop_replies(mut self, count: usize) -> Self {
        self.drop_replies = count;
        self
    }

    /// Never reply.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Time a flash takes.
    pub fn with_measure_delay(mut self, delay: Duration) -> Self {
        self.measure_delay = delay;
        self
    }

    /// Spawn the simulator on one end of a duplex stream and return the other
    /// end as a serial port.
    pub fn spawn(self) -> (DynSerial, JoinHandle<SimulatorLog>) {
        let (host, device) = tokio::io::duplex(4096);
        let handle = tokio::spawn(self.run(device));
        (Box::new(host), handle)
    }

    /// Serve the protocol on `stream` until the host closes it.
    pub async fn run<S>(self, stream: S) -> SimulatorLog
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stream = BufReader::new(stream);
        let mut log = SimulatorLog::default();
        let mut state = DeviceState {
            calibrated: !self.require_calibration,
            has_data: false,
            drop_remaining: self.drop_replies,
        };

        loop {
            let mut line = Vec::new();
            match stream.read_until(b'\r', &mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let command = String::from_utf8_lossy(&line).trim().to_string();
            trace!(%command, "Simulator received");
            log.commands.push(command.clone());

            let reply = self.respond(&command, &mut state).await;
            if self.silent || state.drop_remaining > 0 {
                state.drop_remaining = state.drop_remaining.saturating_sub(1);
                log.dropped += 1;
                debug!(%command, "Simulator withholding reply");
                continue;
            }

            let out = format!("{reply}\r\n");
            if stream.get_mut().write_all(out.as_bytes()).await.is_err() {
                break;
            }
            if stream.get_mut().flush().await.is_err() {
                break;
            }
        }
        log
    }

    async fn respond(&self, command: &str, state: &mut DeviceState) -> String {
        let mut words = command.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        let status = |code: &str| {
            trace!(code, message = status_message(code), "Simulator status");
            format!("<{code}>")
        };

        match (verb, args.as_slice()) {
            ("IV", []) => format!(
                "<00>{},{},{}",
                self.model, self.firmware, self.serial_number
            ),
            ("CW", []) => {
                state.calibrated = true;
                status("00")
            }
            ("CB", []) => status("00"),
            ("SM", [specular, aperture]) => {
                let specular_ok = matches!(*specular, "I" | "E" | "-");
                let aperture_ok = matches!(*aperture, "L" | "S" | "-");
                if specular_ok && aperture_ok {
                    status("00")
                } else {
                    status("02")
                }
            }
            ("MS", [count]) => match count.parse::<u8>() {
                Ok(1..=9) if !state.calibrated => status("10"),
                Ok(1..=9) => {
                    tokio::time::sleep(self.measure_delay).await;
                    state.has_data = true;
                    status("00")
                }
                _ => status("02"),
            },
            ("RS", []) if !state.has_data => status("21"),
            ("RS", []) => {
                let mut reply = format!("<00>{START_NM},{INTERVAL_NM},{SAMPLES}");
                for i in 0..SAMPLES {
                    let nm = START_NM + INTERVAL_NM * i as f64;
                    let value = match &self.reflectance {
                        Some(reflectance) => reflectance.value_at(nm),
                        None => orange(nm),
                    };
                    let percent = value * 100.0;
                    reply.push_str(&format!(",{percent:.2}"));
                }
                reply
            }
            _ => status("01"),
        }
    }
}

struct DeviceState {
    calibrated: bool,
    has_data: bool,
    drop_remaining: usize,
}

fn orange(nm: f64) -> f64 {
    0.05 + 0.80 / (1.0 + (-(nm - 590.0) / 15.0).exp())
}

/// The curve a default simulator reports: a smooth long-pass shape
/// resembling an orange paint chip.
pub fn orange_sample() -> SpectroResult<Reflectance> {
    let values = (0..SAMPLES)
        .map(|i| orange(START_NM + INTERVAL_NM * i as f64))
        .collect();
    Reflectance::new(START_NM, INTERVAL_NM, values)
}

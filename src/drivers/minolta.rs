//! Konica Minolta CM series (CM-2600d, CM-2500d) driver.
//!
//! Commands and replies are CRLF-terminated ASCII lines. Replies start with
//! `OKnn` on success (a non-zero `nn` is a warning) or `ERnn` on failure,
//! optionally followed by comma-separated data. Spectral data covers
//! 360-740 nm in 10 nm steps as integers in 0.01 % units.

use super::{
    hundredths_of_percent, Aperture, CalibrationStep, Capabilities, DriverKind,
    MeasurementSettings, SpecularMode, SpectroDriver,
};
use crate::colorimetry::Reflectance;
use crate::error::{SpectroError, SpectroResult};
use crate::protocol::command::{
    BoxedCommand, InstrumentInfo, Reply, SpectroCommand, DEFAULT_TIMEOUT, MEASURE_TIMEOUT,
};
use crate::protocol::framing::Framing;
use crate::protocol::serial::SerialSettings;
use bytes::Bytes;
use std::time::Duration;

/// Manufacturer name.
pub const VENDOR: &str = "Konica Minolta";

const START_NM: f64 = 360.0;
const INTERVAL_NM: f64 = 10.0;
const SAMPLES: usize = 39;

/// Describe an `ERnn` error code.
pub fn error_message(code: &str) -> &'static str {
    match code {
        "00" => "invalid command",
        "01" => "invalid parameter",
        "02" => "no measurement data",
        "10" => "white calibration required",
        "11" => "zero calibration required",
        "17" => "battery too low to measure",
        "20" => "flash lamp failure",
        "30" => "memory full",
        _ => "unknown error",
    }
}

/// Describe an `OKnn` warning code.
pub fn warning_message(code: &str) -> &'static str {
    match code {
        "01" => "battery low",
        "02" => "calibration recommended",
        _ => "unknown warning",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Ack,
    Identity,
    Spectrum,
}

#[derive(Debug, Clone)]
struct MinoltaCommand {
    name: &'static str,
    line: String,
    expect: Expect,
    timeout: Duration,
    retryable: bool,
}

impl MinoltaCommand {
    fn query(name: &'static str, line: impl Into<String>, expect: Expect) -> Self {
        Self {
            name,
            line: line.into(),
            expect,
            timeout: DEFAULT_TIMEOUT,
            retryable: true,
        }
    }

    fn action(name: &'static str, line: impl Into<String>) -> Self {
        Self {
            name,
            line: line.into(),
            expect: Expect::Ack,
            timeout: MEASURE_TIMEOUT,
            retryable: false,
        }
    }

    fn data<'a>(&self, frame: &'a [u8]) -> SpectroResult<&'a str> {
        let text = std::str::from_utf8(frame)
            .map_err(|_| SpectroError::Framing(format!("non-ASCII reply to {}", self.name)))?;
        if text.len() < 4 || !text.is_char_boundary(4) {
            return Err(SpectroError::Framing(format!(
                "short reply to {}: {text:?}",
                self.name
            )));
        }
        let (status, rest) = text.split_at(4);
        let (kind, code) = status.split_at(2);
        match kind {
            "OK" => {
                if code != "00" {
                    tracing::warn!(command = self.name, code, "{}", warning_message(code));
                }
            }
            "ER" => return Err(SpectroError::instrument(code, error_message(code))),
            _ => {
                return Err(SpectroError::Framing(format!(
                    "reply to {} lacks status: {text:?}",
                    self.name
                )))
            }
        }
        Ok(rest.strip_prefix(',').unwrap_or(rest))
    }
}

impl SpectroCommand for MinoltaCommand {
    fn name(&self) -> &str {
        self.name
    }

    fn encode(&self) -> Bytes {
        Bytes::from(format!("{}\r\n", self.line))
    }

    fn framing(&self) -> Framing {
        Framing::Line {
            terminator: b"\r\n",
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn retryable(&self) -> bool {
        self.retryable
    }

    fn interpret(&self, frame: &[u8]) -> SpectroResult<Reply> {
        let data = self.data(frame)?;
        match self.expect {
            Expect::Ack => Ok(Reply::Ack),
            Expect::Identity => {
                let fields: Vec<&str> = data.split(',').map(str::trim).collect();
                match fields.as_slice() {
                    [model, firmware, serial] => Ok(Reply::Identity(InstrumentInfo {
                        vendor: VENDOR.to_string(),
                        model: model.to_string(),
                        firmware: firmware.to_string(),
                        serial_number: serial.to_string(),
                    })),
                    _ => Err(SpectroError::parse(self.name, format!("bad identity {data:?}"))),
                }
            }
            Expect::Spectrum => {
                let values = data
                    .split(',')
                    .map(|field| hundredths_of_percent(self.name, field))
                    .collect::<SpectroResult<Vec<f64>>>()?;
                if values.len() != SAMPLES {
                    return Err(SpectroError::parse(
                        self.name,
                        format!("expected {SAMPLES} values, got {}", values.len()),
                    ));
                }
                Ok(Reply::Spectrum(Reflectance::new(START_NM, INTERVAL_NM, values)?))
            }
        }
    }
}

/// Driver for Konica Minolta CM series instruments.
#[derive(Debug, Clone)]
pub struct MinoltaDriver {
    model: String,
}

impl MinoltaDriver {
    /// Driver for the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl Default for MinoltaDriver {
    fn default() -> Self {
        Self::new("CM-2600d")
    }
}

impl SpectroDriver for MinoltaDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Minolta
    }

    fn vendor(&self) -> &'static str {
        VENDOR
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            start_nm: START_NM,
            end_nm: 740.0,
            interval_nm: INTERVAL_NM,
            specular_modes: vec![SpecularMode::Included, SpecularMode::Excluded],
            apertures: vec![Aperture::Medium, Aperture::Small],
            black_calibration: true,
            max_averaging: 10,
        }
    }

    fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(9600)
    }

    fn identify(&self) -> BoxedCommand {
        Box::new(MinoltaCommand::query("IDR", "IDR", Expect::Identity))
    }

    fn calibrate(&self, step: CalibrationStep) -> SpectroResult<Vec<BoxedCommand>> {
        let command = match step {
            CalibrationStep::White => MinoltaCommand::action("CAL", "CAL"),
            CalibrationStep::Black => MinoltaCommand::action("CAZ", "CAZ"),
        };
        Ok(vec![Box::new(command)])
    }

    fn measure(&self, settings: &MeasurementSettings) -> SpectroResult<Vec<BoxedCommand>> {
        let mut commands: Vec<BoxedCommand> = Vec::with_capacity(3);
        if settings.specular.is_some() || settings.aperture.is_some() {
            let specular = match settings.specular {
                Some(SpecularMode::Included) => "0",
                Some(SpecularMode::Excluded) => "1",
                None => "-",
            };
            let aperture = match settings.aperture {
                Some(Aperture::Medium) => "0",
                Some(Aperture::Small) => "1",
                Some(other) => return Err(SpectroError::Unsupported(format!("{other} aperture"))),
                None => "-",
            };
            commands.push(Box::new(MinoltaCommand::query(
                "CND",
                format!("CND,{specular},{aperture}"),
                Expect::Ack,
            )));
        }
        commands.push(Box::new(MinoltaCommand::action(
            "MES",
            format!("MES,{}", settings.averaging),
        )));
        commands.push(Box::new(MinoltaCommand::query("NDR", "NDR", Expect::Spectrum)));
        Ok(commands)
    }
}

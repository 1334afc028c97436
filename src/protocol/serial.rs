//! Serial link abstractions.
//!
//! - [`SerialPortIO`]: any `AsyncRead + AsyncWrite` byte stream usable as a port
//! - [`DynSerial`]: type-erased boxed port
//! - [`SerialSettings`]: line parameters a driver declares for its instrument
//! - [`open_serial_async`]: open a real port with `spawn_blocking`
//! - [`drain_serial_buffer`]: discard stale bytes before sending a command
//!
//! Tests run the whole stack over `tokio::io::duplex`, which satisfies
//! [`SerialPortIO`] through the blanket implementation.

use crate::error::SpectroResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Trait alias for async serial port I/O.
///
/// Implemented for `tokio_serial::SerialStream`, `tokio::io::DuplexStream`
/// and any other `AsyncRead + AsyncWrite + Unpin + Send` type.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Parity bit setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopBits {
    /// One stop bit.
    #[default]
    One,
    /// Two stop bits.
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// XON/XOFF.
    Software,
    /// RTS/CTS.
    Hardware,
}

/// Line parameters for an instrument's serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Baud rate.
    pub baud_rate: u32,
    /// Data bits per character (5..=8).
    pub data_bits: u8,
    /// Parity.
    pub parity: Parity,
    /// Stop bits.
    pub stop_bits: StopBits,
    /// Flow control.
    pub flow_control: FlowControl,
}

impl SerialSettings {
    /// 8N1 without flow control at the given baud rate.
    pub const fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }

    /// Set the parity.
    pub const fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Set the data bits.
    pub const fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    /// Set the stop bits.
    pub const fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Set the flow control mode.
    pub const fn with_flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self::new(9600)
    }
}

/// Open a serial port asynchronously using `spawn_blocking`.
///
/// # Errors
///
/// `SpectroError::Serial` if the port cannot be opened or the settings are
/// not representable.
#[cfg(feature = "serial")]
pub async fn open_serial_async(path: &str, settings: &SerialSettings) -> SpectroResult<DynSerial> {
    use crate::error::SpectroError;
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let data_bits = match settings.data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        8 => tokio_serial::DataBits::Eight,
        other => {
            return Err(SpectroError::Serial(format!(
                "unsupported data bits: {other}"
            )))
        }
    };
    let parity = match settings.parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    };
    let stop_bits = match settings.stop_bits {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    };
    let flow_control = match settings.flow_control {
        FlowControl::None => tokio_serial::FlowControl::None,
        FlowControl::Software => tokio_serial::FlowControl::Software,
        FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
    };

    let path_owned = path.to_string();
    let baud_rate = settings.baud_rate;
    let stream = spawn_blocking(move || {
        tokio_serial::new(&path_owned, baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(flow_control)
            .open_native_async()
            .map_err(|e| SpectroError::Serial(format!("failed to open {path_owned}: {e}")))
    })
    .await
    .map_err(|e| SpectroError::Serial(format!("spawn_blocking for serial open failed: {e}")))??;

    tracing::info!(path, baud_rate, "Opened serial port");
    Ok(Box::new(stream))
}

/// Serial support compiled out.
#[cfg(not(feature = "serial"))]
pub async fn open_serial_async(_path: &str, _settings: &SerialSettings) -> SpectroResult<DynSerial> {
    Err(crate::error::SpectroError::SerialFeatureDisabled)
}

/// Read and discard whatever arrives within `window`.
///
/// Returns the number of bytes discarded. Stops early on EOF or I/O error;
/// the next real read reports those.
pub async fn drain_serial_buffer<R: AsyncRead + Unpin>(port: &mut R, window: Duration) -> usize {
    let mut discard = [0u8; 256];
    let deadline = tokio::time::Instant::now() + window;
    let mut total = 0usize;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, port.read(&mut discard)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => total += n,
            Ok(Err(_)) | Err(_) => break,
        }
    }

    total
}

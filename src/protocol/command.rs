//! Request/response units of an instrument wire protocol.

use super::framing::Framing;
use crate::colorimetry::Reflectance;
use crate::error::SpectroResult;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default reply timeout for queries.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Reply timeout for commands that fire the flash or move a calibration shutter.
pub const MEASURE_TIMEOUT: Duration = Duration::from_secs(6);

/// Identifier assigned to each queued job.
pub type CommandId = u64;

/// Identity reported by an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    /// Manufacturer.
    pub vendor: String,
    /// Model name as reported by the device.
    pub model: String,
    /// Firmware revision.
    pub firmware: String,
    /// Serial number.
    pub serial_number: String,
}

impl fmt::Display for InstrumentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (firmware {}, S/N {})",
            self.vendor, self.model, self.firmware, self.serial_number
        )
    }
}

/// Decoded reply to a [`SpectroCommand`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Command accepted, no payload.
    Ack,
    /// Identification data.
    Identity(InstrumentInfo),
    /// Spectral reflectance data.
    Spectrum(Reflectance),
    /// Free-form text payload.
    Text(String),
}

/// A single request/response unit in an instrument's wire protocol.
///
/// Implementors know how to build the outgoing bytes and how to interpret the
/// reply frame. Reading the frame off the link is the session's job, guided by
/// [`SpectroCommand::framing`].
pub trait SpectroCommand: Send + Sync + fmt::Debug {
    /// Short name used in logs and events.
    fn name(&self) -> &str;

    /// Bytes to write, terminator included.
    fn encode(&self) -> Bytes;

    /// Shape of the reply frame. [`Framing::None`] means no reply is expected.
    fn framing(&self) -> Framing;

    /// How long to wait for the reply frame.
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Whether resending after a timeout or garbled frame is safe.
    ///
    /// Queries are; commands that trigger a flash or a calibration are not,
    /// since the instrument may already have acted on the first copy.
    fn retryable(&self) -> bool {
        true
    }

    /// Decode a reply frame (delimiters already stripped).
    ///
    /// Called with an empty slice when the framing is [`Framing::None`].
    fn interpret(&self, frame: &[u8]) -> SpectroResult<Reply>;
}

/// Type-erased command, as stored in the session queue.
pub type BoxedCommand = Box<dyn SpectroCommand>;

/// Render bytes for trace logs: printable ASCII as-is, everything else escaped.
pub fn escape_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}

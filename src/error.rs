//! Custom error types for the library.
//!
//! This module defines the primary error type, `SpectroError`, shared by the
//! colorimetry code, the protocol engine and the vendor drivers. Using the
//! `thiserror` crate, it provides one consistent way to report everything from
//! I/O and configuration issues to status codes returned by an instrument.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, raised while parsing or merging
//!   configuration sources.
//! - **`Configuration`**: Semantic configuration problems caught by validation
//!   (unknown driver names, duplicate instrument ids, ...).
//! - **`Io`**: Wraps `std::io::Error` from the serial link or files.
//! - **`Timeout`**, **`Framing`**: Link-level failures. These are *recoverable*:
//!   the session's retry policy may resend the command.
//! - **`UnexpectedEof`**: The link closed. The session fails every pending job.
//! - **`Instrument`**: A status code reported by the instrument itself, already
//!   decoded by the driver into a message.
//! - **`Parse`**: A reply frame arrived but its payload could not be decoded.
//! - **`InvalidSpectrum`**: Reflectance data that breaks the sampling invariants.
//! - **`Unsupported`**: The driver cannot honour the requested operation.
//! - **`QueueFull`**, **`QueueClosed`**, **`SessionClosed`**: Command queue and
//!   session lifecycle.
//!
//! By using `#[from]`, `SpectroError` can be created from the underlying error
//! types with the `?` operator.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type SpectroResult<T> = std::result::Result<T, SpectroError>;

/// Errors produced by the colorimetry, protocol and driver layers.
#[derive(Error, Debug)]
pub enum SpectroError {
    /// Configuration source could not be read or merged.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serial port could not be opened.
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Serial support was compiled out.
    #[error("Serial support not enabled. Rebuild with --features serial")]
    SerialFeatureDisabled,

    /// No reply arrived within the command's timeout.
    #[error("Command '{command}' timed out after {timeout:?}")]
    Timeout {
        /// Command name.
        command: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// A reply frame was malformed (bad checksum, missing delimiter, oversize).
    #[error("Framing error: {0}")]
    Framing(String),

    /// The link closed while a frame was being read.
    #[error("Unexpected EOF from serial port")]
    UnexpectedEof,

    /// The instrument reported an error status.
    #[error("Instrument error {code}: {message}")]
    Instrument {
        /// Vendor status code as sent on the wire.
        code: String,
        /// Decoded description of the status code.
        message: String,
    },

    /// The reply payload could not be decoded.
    #[error("Failed to parse reply to '{command}': {detail}")]
    Parse {
        /// Command name.
        command: String,
        /// What went wrong.
        detail: String,
    },

    /// Reflectance data violates the sampling invariants.
    #[error("Invalid spectrum: {0}")]
    InvalidSpectrum(String),

    /// Operation is not supported by this driver or configuration.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The command queue is at capacity.
    #[error("Command queue is full (capacity {0})")]
    QueueFull(usize),

    /// The command queue was closed.
    #[error("Command queue is closed")]
    QueueClosed,

    /// The session was shut down or lost its link.
    #[error("Session closed")]
    SessionClosed,
}

impl SpectroError {
    /// Build a parse error for the named command.
    pub fn parse(command: impl Into<String>, detail: impl Into<String>) -> Self {
        SpectroError::Parse {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// Build an instrument status error.
    pub fn instrument(code: impl Into<String>, message: impl Into<String>) -> Self {
        SpectroError::Instrument {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether resending the same command might succeed.
    ///
    /// Timeouts and garbled frames are recoverable. Errors reported by the
    /// instrument itself, parse failures and a closed link are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SpectroError::Timeout { .. } | SpectroError::Framing(_))
    }

    /// Whether the serial link is unusable after this error.
    pub fn is_link_lost(&self) -> bool {
        matches!(self, SpectroError::UnexpectedEof | SpectroError::Io(_))
    }
}

impl From<figment::Error> for SpectroError {
    fn from(value: figment::Error) -> Self {
        SpectroError::Config(Box::new(value))
    }
}

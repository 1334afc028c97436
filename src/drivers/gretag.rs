//! GretagMacbeth Spectrolino driver.
//!
//! Binary messages travel hex-encoded inside text lines. Requests are
//! `"; " + HEX + "\r\n"`, replies `": " + HEX + "\r\n"`. A decoded request is
//! `[type, payload...]`; a decoded reply is `[type, status, payload...]` where
//! `type` echoes the request.
//!
//! | Type | Request payload | Reply payload |
//! |------|-----------------|---------------|
//! | `0x01` identify | - | ASCII `model,firmware,serial` |
//! | `0x10` white calibration | - | - |
//! | `0x20` measure | averaging count | - |
//! | `0x21` read spectrum | - | 36 x `f32` LE reflectance factors, 380-730 nm |
//!
//! The 45/0 geometry has no specular mode and no black calibration.

use super::{Aperture, CalibrationStep, Capabilities, DriverKind, MeasurementSettings, SpectroDriver};
use crate::colorimetry::Reflectance;
use crate::error::{SpectroError, SpectroResult};
use crate::protocol::command::{
    BoxedCommand, InstrumentInfo, Reply, SpectroCommand, DEFAULT_TIMEOUT, MEASURE_TIMEOUT,
};
use crate::protocol::framing::Framing;
use crate::protocol::serial::SerialSettings;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

/// Manufacturer name.
pub const VENDOR: &str = "GretagMacbeth";

/// Identify message type.
pub const MSG_IDENTIFY: u8 = 0x01;
/// White calibration message type.
pub const MSG_WHITE_CALIBRATION: u8 = 0x10;
/// Measure message type.
pub const MSG_MEASURE: u8 = 0x20;
/// Read spectrum message type.
pub const MSG_READ_SPECTRUM: u8 = 0x21;

const START_NM: f64 = 380.0;
const INTERVAL_NM: f64 = 10.0;
const SAMPLES: usize = 36;

/// Describe a Spectrolino status byte.
pub fn status_message(status: u8) -> &'static str {
    match status {
        0x00 => "ok",
        0x01 => "unknown message type",
        0x02 => "invalid parameter",
        0x10 => "white calibration required",
        0x11 => "white reference not recognised",
        0x20 => "measurement failed",
        0x21 => "no valid measurement",
        0x30 => "filter not in position",
        _ => "unknown status",
    }
}

/// Uppercase hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// Decode a hex string, ignoring whitespace.
pub fn hex_decode(text: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}

#[derive(Debug, Clone)]
struct GretagCommand {
    name: &'static str,
    message: u8,
    payload: Vec<u8>,
    timeout: Duration,
    retryable: bool,
}

impl GretagCommand {
    fn query(name: &'static str, message: u8) -> Self {
        Self {
            name,
            message,
            payload: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            retryable: true,
        }
    }

    fn action(name: &'static str, message: u8, payload: Vec<u8>) -> Self {
        Self {
            name,
            message,
            payload,
            timeout: MEASURE_TIMEOUT,
            retryable: false,
        }
    }

    fn decode(&self, frame: &[u8]) -> SpectroResult<Vec<u8>> {
        let text = std::str::from_utf8(frame)
            .ok()
            .and_then(|t| t.strip_prefix(": "))
            .ok_or_else(|| SpectroError::Framing(format!("reply to {} lacks ': ' prefix", self.name)))?;
        let mut raw = hex_decode(text)
            .ok_or_else(|| SpectroError::Framing(format!("reply to {} is not hex", self.name)))?;

        let &[message, status, ..] = raw.as_slice() else {
            return Err(SpectroError::Framing(format!("reply to {} too short", self.name)));
        };
        if message != self.message {
            return Err(SpectroError::Framing(format!(
                "reply type {message:#04x} does not match request {:#04x}",
                self.message
            )));
        }
        if status != 0 {
            return Err(SpectroError::instrument(
                format!("{status:02X}"),
                status_message(status),
            ));
        }
        Ok(raw.split_off(2))
    }

    fn parse_identity(&self, payload: &[u8]) -> SpectroResult<Reply> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| SpectroError::parse(self.name, "identity is not ASCII"))?;
        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        let [model, firmware, serial] = fields.as_slice() else {
            return Err(SpectroError::parse(self.name, format!("bad identity {text:?}")));
        };
        Ok(Reply::Identity(InstrumentInfo {
            vendor: VENDOR.to_string(),
            model: model.to_string(),
            firmware: firmware.to_string(),
            serial_number: serial.to_string(),
        }))
    }

    fn parse_spectrum(&self, payload: &[u8]) -> SpectroResult<Reply> {
        if payload.len() != SAMPLES * 4 {
            return Err(SpectroError::parse(
                self.name,
                format!("expected {} bytes, got {}", SAMPLES * 4, payload.len()),
            ));
        }
        let values = payload
            .chunks_exact(4)
            .map(|c| f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
            .collect();
        Ok(Reply::Spectrum(Reflectance::new(START_NM, INTERVAL_NM, values)?))
    }
}

impl SpectroCommand for GretagCommand {
    fn name(&self) -> &str {
        self.name
    }

    fn encode(&self) -> Bytes {
        let mut raw = Vec::with_capacity(1 + self.payload.len());
        raw.push(self.message);
        raw.extend_from_slice(&self.payload);

        let mut out = BytesMut::new();
        out.put_slice(b"; ");
        out.put_slice(hex_encode(&raw).as_bytes());
        out.put_slice(b"\r\n");
        out.freeze()
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
        let payload = self.decode(frame)?;
        match self.message {
            MSG_IDENTIFY => self.parse_identity(&payload),
            MSG_READ_SPECTRUM => self.parse_spectrum(&payload),
            _ => Ok(Reply::Ack),
        }
    }
}

/// Driver for the GretagMacbeth Spectrolino.
#[derive(Debug, Clone)]
pub struct GretagDriver {
    model: String,
}

impl GretagDriver {
    /// Driver for the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl Default for GretagDriver {
    fn default() -> Self {
        Self::new("Spectrolino")
    }
}

impl SpectroDriver for GretagDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Gretag
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
            end_nm: 730.0,
            interval_nm: INTERVAL_NM,
            specular_modes: Vec::new(),
            apertures: vec![Aperture::Medium],
            black_calibration: false,
            max_averaging: 4,
        }
    }

    fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(9600)
    }

    fn identify(&self) -> BoxedCommand {
        Box::new(GretagCommand::query("identify", MSG_IDENTIFY))
    }

    fn calibrate(&self, step: CalibrationStep) -> SpectroResult<Vec<BoxedCommand>> {
        match step {
            CalibrationStep::White => Ok(vec![Box::new(GretagCommand::action(
                "white-calibration",
                MSG_WHITE_CALIBRATION,
                Vec::new(),
            ))]),
            CalibrationStep::Black => Err(self.unsupported_calibration(step)),
        }
    }

    fn measure(&self, settings: &MeasurementSettings) -> SpectroResult<Vec<BoxedCommand>> {
        Ok(vec![
            Box::new(GretagCommand::action(
                "measure",
                MSG_MEASURE,
                vec![settings.averaging],
            )),
            Box::new(GretagCommand::query("read-spectrum", MSG_READ_SPECTRUM)),
        ])
    }
}

//! X-Rite SP series (SP62/SP64) driver.
//!
//! Commands are ASCII terminated by CR. Every reply is one CRLF-terminated
//! line starting with a two-digit status in angle brackets, optionally
//! followed by comma-separated data:
//!
//! ```text
//! > IV\r
//! < <00>SP64,2.10,012345\r\n
//! > RS\r
//! < <00>400,10,31,5.12,5.34,...\r\n
//! ```
//!
//! Spectral data is reported in percent.

use super::{
    Aperture, CalibrationStep, Capabilities, DriverKind, MeasurementSettings, SpecularMode,
    SpectroDriver,
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
pub const VENDOR: &str = "X-Rite";

const REPLY_TERMINATOR: &[u8] = b"\r\n";

/// Describe an X-Rite status code.
pub fn status_message(code: &str) -> &'static str {
    match code {
        "00" => "ok",
        "01" => "unknown command",
        "02" => "invalid parameter",
        "10" => "white calibration required",
        "11" => "black calibration required",
        "12" => "calibration failed",
        "20" => "measurement failed",
        "21" => "no measurement data",
        "30" => "lamp failure",
        "40" => "instrument busy",
        _ => "unknown status",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Ack,
    Identity,
    Spectrum,
}

#[derive(Debug, Clone)]
struct XRiteCommand {
    name: &'static str,
    text: String,
    expect: Expect,
    timeout: Duration,
    retryable: bool,
}

impl XRiteCommand {
    fn query(name: &'static str, text: impl Into<String>, expect: Expect) -> Self {
        Self {
            name,
            text: text.into(),
            expect,
            timeout: DEFAULT_TIMEOUT,
            retryable: true,
        }
    }

    fn action(name: &'static str, text: impl Into<String>) -> Self {
        Self {
            name,
            text: text.into(),
            expect: Expect::Ack,
            timeout: MEASURE_TIMEOUT,
            retryable: false,
        }
    }

    fn payload<'a>(&self, frame: &'a [u8]) -> SpectroResult<&'a str> {
        let text = std::str::from_utf8(frame)
            .map_err(|_| SpectroError::Framing(format!("non-ASCII reply to {}", self.name)))?;
        let bytes = text.as_bytes();
        if bytes.len() < 4 || bytes[0] != b'<' || bytes[3] != b'>' {
            return Err(SpectroError::Framing(format!(
                "reply to {} lacks status prefix: {text:?}",
                self.name
            )));
        }
        let code = &text[1..3];
        if code != "00" {
            return Err(SpectroError::instrument(code, status_message(code)));
        }
        Ok(&text[4..])
    }

    fn parse_identity(&self, payload: &str) -> SpectroResult<Reply> {
        let fields: Vec<&str> = payload.split(',').map(str::trim).collect();
        let [model, firmware, serial] = fields.as_slice() else {
            return Err(SpectroError::parse(
                self.name,
                format!("expected model,firmware,serial; got {payload:?}"),
            ));
        };
        Ok(Reply::Identity(InstrumentInfo {
            vendor: VENDOR.to_string(),
            model: model.to_string(),
            firmware: firmware.to_string(),
            serial_number: serial.to_string(),
        }))
    }

    fn parse_spectrum(&self, payload: &str) -> SpectroResult<Reply> {
        let mut fields = payload.split(',').map(str::trim);
        let mut header = |what: &str| -> SpectroResult<f64> {
            fields
                .next()
                .and_then(|f| f.parse::<f64>().ok())
                .ok_or_else(|| SpectroError::parse(self.name, format!("missing {what}")))
        };
        let start = header("start wavelength")?;
        let interval = header("interval")?;
        let count = header("sample count")? as usize;

        let values = fields
            .map(|f| {
                f.parse::<f64>()
                    .map_err(|_| SpectroError::parse(self.name, format!("bad value {f:?}")))
            })
            .collect::<SpectroResult<Vec<f64>>>()?;
        if values.len() != count {
            return Err(SpectroError::parse(
                self.name,
                format!("header announces {count} samples, got {}", values.len()),
            ));
        }
        Ok(Reply::Spectrum(Reflectance::from_percent(
            start, interval, &values,
        )?))
    }
}

impl SpectroCommand for XRiteCommand {
    fn name(&self) -> &str {
        self.name
    }

    fn encode(&self) -> Bytes {
        Bytes::from(format!("{}\r", self.text))
    }

    fn framing(&self) -> Framing {
        Framing::Line {
            terminator: REPLY_TERMINATOR,
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn retryable(&self) -> bool {
        self.retryable
    }

    fn interpret(&self, frame: &[u8]) -> SpectroResult<Reply> {
        let payload = self.payload(frame)?;
        match self.expect {
            Expect::Ack => Ok(Reply::Ack),
            Expect::Identity => self.parse_identity(payload),
            Expect::Spectrum => self.parse_spectrum(payload),
        }
    }
}

/// Driver for X-Rite SP series instruments.
#[derive(Debug, Clone)]
pub struct XRiteDriver {
    model: String,
}

impl XRiteDriver {
    /// Driver for the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl Default for XRiteDriver {
    fn default() -> Self {
        Self::new("SP64")
    }
}

impl SpectroDriver for XRiteDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::XRite
    }

    fn vendor(&self) -> &'static str {
        VENDOR
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            start_nm: 400.0,
            end_nm: 700.0,
            interval_nm: 10.0,
            specular_modes: vec![SpecularMode::Included, SpecularMode::Excluded],
            apertures: vec![Aperture::Large, Aperture::Small],
            black_calibration: true,
            max_averaging: 9,
        }
    }

    fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(9600)
    }

    fn identify(&self) -> BoxedCommand {
        Box::new(XRiteCommand::query("IV", "IV", Expect::Identity))
    }

    fn calibrate(&self, step: CalibrationStep) -> SpectroResult<Vec<BoxedCommand>> {
        let command = match step {
            CalibrationStep::White => XRiteCommand::action("CW", "CW"),
            CalibrationStep::Black => XRiteCommand::action("CB", "CB"),
        };
        Ok(vec![Box::new(command)])
    }

    fn measure(&self, settings: &MeasurementSettings) -> SpectroResult<Vec<BoxedCommand>> {
        let mut commands: Vec<BoxedCommand> = Vec::with_capacity(3);
        if settings.specular.is_some() || settings.aperture.is_some() {
            let specular = match settings.specular {
                Some(SpecularMode::Included) => "I",
                Some(SpecularMode::Excluded) => "E",
                None => "-",
            };
            let aperture = match settings.aperture {
                Some(Aperture::Large) => "L",
                Some(Aperture::Small) => "S",
                Some(other) => {
                    return Err(SpectroError::Unsupported(format!("{other} aperture")));
                }
                None => "-",
            };
            commands.push(Box::new(XRiteCommand::query(
                "SM",
                format!("SM {specular} {aperture}"),
                Expect::Ack,
            )));
        }
        commands.push(Box::new(XRiteCommand::action(
            "MS",
            format!("MS {}", settings.averaging),
        )));
        commands.push(Box::new(XRiteCommand::query("RS", "RS", Expect::Spectrum)));
        Ok(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpret(command: &BoxedCommand, frame: &str) -> SpectroResult<Reply> {
        command.interpret(frame.as_bytes())
    }

    #[test]
    fn identify_parses_fields() {
        let driver = XRiteDriver::default();
        let cmd = driver.identify();
        assert_eq!(&cmd.encode()[..], b"IV\r");
        let Reply::Identity(info) = interpret(&cmd, "<00>SP64,2.10,012345").unwrap() else {
            panic!("expected identity");
        };
        assert_eq!(info.vendor, "X-Rite");
        assert_eq!(info.model, "SP64");
        assert_eq!(info.firmware, "2.10");
        assert_eq!(info.serial_number, "012345");
    }

    #[test]
    fn status_codes_become_instrument_errors() {
        let cmd = XRiteDriver::default().identify();
        match interpret(&cmd, "<10>") {
            Err(SpectroError::Instrument { code, message }) => {
                assert_eq!(code, "10");
                assert_eq!(message, "white calibration required");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_status_prefix_is_framing_error() {
        let cmd = XRiteDriver::default().identify();
        assert!(matches!(interpret(&cmd, "SP64"), Err(SpectroError::Framing(_))));
    }

    #[test]
    fn measure_sequence() {
        let driver = XRiteDriver::default();
        let settings = MeasurementSettings::default()
            .with_specular(SpecularMode::Excluded)
            .with_averaging(3);
        let cmds = driver.measure(&settings).unwrap();
        let encoded: Vec<_> = cmds.iter().map(|c| c.encode()).collect();
        assert_eq!(encoded, vec![
            Bytes::from_static(b"SM E -\r"),
            Bytes::from_static(b"MS 3\r"),
            Bytes::from_static(b"RS\r"),
        ]);
        assert!(!cmds[1].retryable());
        assert_eq!(cmds[1].timeout(), MEASURE_TIMEOUT);
        assert!(cmds[2].retryable());
    }

    #[test]
    fn default_settings_skip_mode_command() {
        let cmds = XRiteDriver::default()
            .measure(&MeasurementSettings::default())
            .unwrap();
        assert_eq!(cmds.len(), 2);
    }

    #[test]
    fn spectrum_in_percent() {
        let cmds = XRiteDriver::default()
            .measure(&MeasurementSettings::default())
            .unwrap();
        let Reply::Spectrum(refl) = interpret(&cmds[1], "<00>400,10,3,50.0,25.0,10.0").unwrap()
        else {
            panic!("expected spectrum");
        };
        assert_eq!(refl.start_nm(), 400.0);
        assert_eq!(refl.values(), &[0.5, 0.25, 0.1]);
    }

    #[test]
    fn spectrum_count_mismatch() {
        let cmds = XRiteDriver::default()
            .measure(&MeasurementSettings::default())
            .unwrap();
        assert!(matches!(
            interpret(&cmds[1], "<00>400,10,4,50.0,25.0"),
            Err(SpectroError::Parse { .. })
        ));
    }

    #[test]
    fn validate_rejects_medium_aperture() {
        let driver = XRiteDriver::default();
        let settings = MeasurementSettings::default().with_aperture(Aperture::Medium);
        assert!(matches!(
            driver.validate(&settings),
            Err(SpectroError::Unsupported(_))
        ));
        assert!(driver
            .validate(&MeasurementSettings::default().with_averaging(10))
            .is_err());
    }
}

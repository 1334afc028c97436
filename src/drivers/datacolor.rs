//! Datacolor SF series (SF600, SF650) driver.
//!
//! Commands are CR-terminated ASCII. Replies are binary blocks prefixed with
//! a big-endian `u16` length; the block is `[status, payload...]`.
//! Measurement is a single `MR` command that fires the flash and returns the
//! spectrum: 35 little-endian `u16` values in 0.01 % units, 360-700 nm.

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
use crate::protocol::serial::{FlowControl, SerialSettings};
use bytes::Bytes;
use std::time::Duration;

/// Manufacturer name.
pub const VENDOR: &str = "Datacolor";

const START_NM: f64 = 360.0;
const INTERVAL_NM: f64 = 10.0;
const SAMPLES: usize = 35;

/// Describe a Datacolor status byte.
pub fn status_message(status: u8) -> &'static str {
    match status {
        0x00 => "ok",
        0x01 => "invalid command",
        0x02 => "invalid parameter",
        0x03 => "calibration required",
        0x04 => "flash failure",
        0x05 => "sample port not closed",
        0x06 => "black trap not detected",
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
struct DatacolorCommand {
    name: &'static str,
    text: String,
    expect: Expect,
    timeout: Duration,
    retryable: bool,
}

impl DatacolorCommand {
    fn new(name: &'static str, text: impl Into<String>, expect: Expect) -> Self {
        Self {
            name,
            text: text.into(),
            expect,
            timeout: DEFAULT_TIMEOUT,
            retryable: true,
        }
    }

    fn triggering(mut self) -> Self {
        self.timeout = MEASURE_TIMEOUT;
        self.retryable = false;
        self
    }

    fn spectrum(&self, payload: &[u8]) -> SpectroResult<Reply> {
        if payload.len() != SAMPLES * 2 {
            return Err(SpectroError::parse(
                self.name,
                format!("expected {} bytes, got {}", SAMPLES * 2, payload.len()),
            ));
        }
        let values = payload
            .chunks_exact(2)
            .map(|c| f64::from(u16::from_le_bytes([c[0], c[1]])) / 10_000.0)
            .collect();
        Ok(Reply::Spectrum(Reflectance::new(START_NM, INTERVAL_NM, values)?))
    }
}

impl SpectroCommand for DatacolorCommand {
    fn name(&self) -> &str {
        self.name
    }

    fn encode(&self) -> Bytes {
        Bytes::from(format!("{}\r", self.text))
    }

    fn framing(&self) -> Framing {
        Framing::LengthPrefixed
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn retryable(&self) -> bool {
        self.retryable
    }

    fn interpret(&self, frame: &[u8]) -> SpectroResult<Reply> {
        let Some((&status, payload)) = frame.split_first() else {
            return Err(SpectroError::Framing(format!("empty reply to {}", self.name)));
        };
        if status != 0 {
            return Err(SpectroError::instrument(
                format!("{status:02X}"),
                status_message(status),
            ));
        }
        match self.expect {
            Expect::Ack => Ok(Reply::Ack),
            Expect::Identity => {
                let text = String::from_utf8_lossy(payload);
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
            Expect::Spectrum => self.spectrum(payload),
        }
    }
}

/// Driver for Datacolor SF series instruments.
#[derive(Debug, Clone)]
pub struct DatacolorDriver {
    model: String,
}

impl DatacolorDriver {
    /// Driver for the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl Default for DatacolorDriver {
    fn default() -> Self {
        Self::new("SF600")
    }
}

impl SpectroDriver for DatacolorDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Datacolor
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
            end_nm: 700.0,
            interval_nm: INTERVAL_NM,
            specular_modes: vec![SpecularMode::Included, SpecularMode::Excluded],
            apertures: vec![Aperture::Large, Aperture::Medium, Aperture::Small],
            black_calibration: true,
            max_averaging: 20,
        }
    }

    fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(19200).with_flow_control(FlowControl::Hardware)
    }

    fn identify(&self) -> BoxedCommand {
        Box::new(DatacolorCommand::new("ID", "ID", Expect::Identity))
    }

    fn calibrate(&self, step: CalibrationStep) -> SpectroResult<Vec<BoxedCommand>> {
        let command = match step {
            CalibrationStep::White => DatacolorCommand::new("CW", "CW", Expect::Ack),
            CalibrationStep::Black => DatacolorCommand::new("CB", "CB", Expect::Ack),
        };
        Ok(vec![Box::new(command.triggering())])
    }

    fn measure(&self, settings: &MeasurementSettings) -> SpectroResult<Vec<BoxedCommand>> {
        let mut commands: Vec<BoxedCommand> = Vec::with_capacity(2);
        if settings.specular.is_some() || settings.aperture.is_some() {
            let specular = match settings.specular {
                Some(SpecularMode::Included) => 'I',
                Some(SpecularMode::Excluded) => 'E',
                None => '-',
            };
            let aperture = match settings.aperture {
                Some(Aperture::Large) => 'L',
                Some(Aperture::Medium) => 'M',
                Some(Aperture::Small) => 'S',
                None => '-',
            };
            commands.push(Box::new(DatacolorCommand::new(
                "CF",
                format!("CF{specular}{aperture}"),
                Expect::Ack,
            )));
        }
        commands.push(Box::new(
            DatacolorCommand::new("MR", format!("MR{:02}", settings.averaging), Expect::Spectrum)
                .triggering(),
        ));
        Ok(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_ascii() {
        let driver = DatacolorDriver::default();
        assert_eq!(&driver.identify().encode()[..], b"ID\r");
        let cmds = driver
            .measure(
                &MeasurementSettings::default()
                    .with_aperture(Aperture::Medium)
                    .with_averaging(4),
            )
            .unwrap();
        assert_eq!(&cmds[0].encode()[..], b"CF-M\r");
        assert_eq!(&cmds[1].encode()[..], b"MR04\r");
        assert_eq!(cmds[1].framing(), Framing::LengthPrefixed);
        assert!(!cmds[1].retryable());
    }

    #[test]
    fn spectrum_is_u16_le() {
        let mut frame = vec![0x00];
        for _ in 0..SAMPLES {
            frame.extend_from_slice(&2500u16.to_le_bytes());
        }
        let cmds = DatacolorDriver::default()
            .measure(&MeasurementSettings::default())
            .unwrap();
        assert_eq!(cmds.len(), 1);
        let Reply::Spectrum(refl) = cmds[0].interpret(&frame).unwrap() else {
            panic!("expected spectrum")
        };
        assert_eq!(refl.len(), 35);
        assert_eq!(refl.start_nm(), 360.0);
        assert!((refl.values()[34] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn identity() {
        let mut frame = vec![0x00];
        frame.extend_from_slice(b"SF600,4.3,DC55012");
        let Reply::Identity(info) = DatacolorDriver::default()
            .identify()
            .interpret(&frame)
            .unwrap()
        else {
            panic!("expected identity")
        };
        assert_eq!(info.vendor, VENDOR);
        assert_eq!(info.serial_number, "DC55012");
    }

    #[test]
    fn status_errors() {
        let cmds = DatacolorDriver::default()
            .calibrate(CalibrationStep::Black)
            .unwrap();
        match cmds[0].interpret(&[0x06]) {
            Err(SpectroError::Instrument { code, message }) => {
                assert_eq!(code, "06");
                assert_eq!(message, "black trap not detected");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn hardware_flow_control() {
        let settings = DatacolorDriver::default().serial_settings();
        assert_eq!(settings.baud_rate, 19200);
        assert_eq!(settings.flow_control, FlowControl::Hardware);
    }
}

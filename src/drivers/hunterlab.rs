//! HunterLab MiniScan XE driver.
//!
//! Messages are framed `STX body ETX BCC` where BCC is the XOR of the body
//! and ETX. Bodies are ASCII so the payload never contains a control byte.
//!
//! - request body: `cmd [params]`
//! - reply body: `cmd status [payload]`, status `'0'` on success
//!
//! | Command | Params | Reply payload |
//! |---------|--------|---------------|
//! | `I` identify | - | `model,firmware,serial` |
//! | `W` / `B` standardize on white tile / black glass | - | - |
//! | `M` measure | specular `I`/`E`/`-`, aperture `L`/`S`/`-`, averaging digit | - |
//! | `D` read data | - | 31 five-digit fields, 0.01 % units, 400-700 nm |

use super::{
    hundredths_of_percent, Aperture, CalibrationStep, Capabilities, DriverKind,
    MeasurementSettings, SpecularMode, SpectroDriver,
};
use crate::colorimetry::Reflectance;
use crate::error::{SpectroError, SpectroResult};
use crate::protocol::command::{
    BoxedCommand, InstrumentInfo, Reply, SpectroCommand, DEFAULT_TIMEOUT, MEASURE_TIMEOUT,
};
use crate::protocol::framing::{encode_stx_etx, Framing};
use crate::protocol::serial::SerialSettings;
use bytes::Bytes;
use std::time::Duration;

/// Manufacturer name.
pub const VENDOR: &str = "HunterLab";

const START_NM: f64 = 400.0;
const INTERVAL_NM: f64 = 10.0;
const SAMPLES: usize = 31;
const FIELD_WIDTH: usize = 5;

/// Status the instrument sends when our frame arrived corrupted.
const STATUS_CHECKSUM: u8 = b'5';

/// Describe a HunterLab status character.
pub fn status_message(status: u8) -> &'static str {
    match status {
        b'0' => "ok",
        b'1' => "unknown command",
        b'2' => "invalid parameter",
        b'3' => "standardization required",
        b'4' => "measurement error",
        b'5' => "checksum error in received frame",
        b'6' => "no data available",
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
struct HunterLabCommand {
    name: &'static str,
    code: u8,
    params: String,
    expect: Expect,
    timeout: Duration,
    retryable: bool,
}

impl HunterLabCommand {
    fn query(name: &'static str, code: u8, expect: Expect) -> Self {
        Self {
            name,
            code,
            params: String::new(),
            expect,
            timeout: DEFAULT_TIMEOUT,
            retryable: true,
        }
    }

    fn action(name: &'static str, code: u8, params: String) -> Self {
        Self {
            name,
            code,
            params,
            expect: Expect::Ack,
            timeout: MEASURE_TIMEOUT,
            retryable: false,
        }
    }
}

impl SpectroCommand for HunterLabCommand {
    fn name(&self) -> &str {
        self.name
    }

    fn encode(&self) -> Bytes {
        let mut body = Vec::with_capacity(1 + self.params.len());
        body.push(self.code);
        body.extend_from_slice(self.params.as_bytes());
        encode_stx_etx(&body)
    }

    fn framing(&self) -> Framing {
        Framing::StxEtx { checksum: true }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn retryable(&self) -> bool {
        self.retryable
    }

    fn interpret(&self, frame: &[u8]) -> SpectroResult<Reply> {
        let [code, status, payload @ ..] = frame else {
            return Err(SpectroError::Framing(format!("reply to {} too short", self.name)));
        };
        if *code != self.code {
            return Err(SpectroError::Framing(format!(
                "reply for '{}' does not match request '{}'",
                char::from(*code),
                char::from(self.code)
            )));
        }
        match *status {
            b'0' => {}
            STATUS_CHECKSUM => {
                return Err(SpectroError::Framing(status_message(STATUS_CHECKSUM).into()))
            }
            other => {
                return Err(SpectroError::instrument(
                    char::from(other).to_string(),
                    status_message(other),
                ))
            }
        }

        if !payload.is_ascii() {
            return Err(SpectroError::parse(self.name, "payload is not ASCII"));
        }
        let payload = std::str::from_utf8(payload)
            .map_err(|e| SpectroError::parse(self.name, e.to_string()))?;
        match self.expect {
            Expect::Ack => Ok(Reply::Ack),
            Expect::Identity => match payload.split(',').map(str::trim).collect::<Vec<_>>()[..] {
                [model, firmware, serial] => Ok(Reply::Identity(InstrumentInfo {
                    vendor: VENDOR.to_string(),
                    model: model.to_string(),
                    firmware: firmware.to_string(),
                    serial_number: serial.to_string(),
                })),
                _ => Err(SpectroError::parse(self.name, format!("bad identity {payload:?}"))),
            },
            Expect::Spectrum => {
                if payload.len() != SAMPLES * FIELD_WIDTH {
                    return Err(SpectroError::parse(
                        self.name,
                        format!(
                            "expected {} characters, got {}",
                            SAMPLES * FIELD_WIDTH,
                            payload.len()
                        ),
                    ));
                }
                // ASCII, so every byte offset is a char boundary.
                let values = (0..SAMPLES)
                    .map(|i| {
                        let field = &payload[i * FIELD_WIDTH..(i + 1) * FIELD_WIDTH];
                        hundredths_of_percent(self.name, field)
                    })
                    .collect::<SpectroResult<Vec<f64>>>()?;
                Ok(Reply::Spectrum(Reflectance::new(START_NM, INTERVAL_NM, values)?))
            }
        }
    }
}

/// Driver for HunterLab MiniScan instruments.
#[derive(Debug, Clone)]
pub struct HunterLabDriver {
    model: String,
}

impl HunterLabDriver {
    /// Driver for the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl Default for HunterLabDriver {
    fn default() -> Self {
        Self::new("MiniScan XE Plus")
    }
}

impl SpectroDriver for HunterLabDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::HunterLab
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
            apertures: vec![Aperture::Large, Aperture::Small],
            black_calibration: true,
            max_averaging: 9,
        }
    }

    fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(9600)
    }

    fn identify(&self) -> BoxedCommand {
        Box::new(HunterLabCommand::query("I", b'I', Expect::Identity))
    }

    fn calibrate(&self, step: CalibrationStep) -> SpectroResult<Vec<BoxedCommand>> {
        let command = match step {
            CalibrationStep::White => HunterLabCommand::action("W", b'W', String::new()),
            CalibrationStep::Black => HunterLabCommand::action("B", b'B', String::new()),
        };
        Ok(vec![Box::new(command)])
    }

    fn measure(&self, settings: &MeasurementSettings) -> SpectroResult<Vec<BoxedCommand>> {
        let specular = match settings.specular {
            Some(SpecularMode::Included) => 'I',
            Some(SpecularMode::Excluded) => 'E',
            None => '-',
        };
        let aperture = match settings.aperture {
            Some(Aperture::Large) => 'L',
            Some(Aperture::Small) => 'S',
            Some(other) => return Err(SpectroError::Unsupported(format!("{other} aperture"))),
            None => '-',
        };
        if settings.averaging > 9 {
            return Err(SpectroError::Unsupported(format!(
                "averaging {} exceeds one digit",
                settings.averaging
            )));
        }
        Ok(vec![
            Box::new(HunterLabCommand::action(
                "M",
                b'M',
                format!("{specular}{aperture}{}", settings.averaging),
            )),
            Box::new(HunterLabCommand::query("D", b'D', Expect::Spectrum)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::framing::{ETX, STX};

    #[test]
    fn measure_frame_layout() {
        let cmds = HunterLabDriver::default()
            .measure(
                &MeasurementSettings::default()
                    .with_specular(SpecularMode::Excluded)
                    .with_averaging(2),
            )
            .unwrap();
        let frame = cmds[0].encode();
        assert_eq!(frame[0], STX);
        assert_eq!(&frame[1..5], b"ME-2");
        assert_eq!(frame[5], ETX);
        assert_eq!(frame[6], b'M' ^ b'E' ^ b'-' ^ b'2' ^ ETX);
    }

    #[test]
    fn spectrum_fields_are_reported_verbatim() {
        let read = HunterLabCommand::query("D", b'D', Expect::Spectrum);

        let mut body = b"D0".to_vec();
        body.extend_from_slice(b"12a45");
        body.extend(std::iter::repeat(b'0').take((SAMPLES - 1) * FIELD_WIDTH));
        let err = read.interpret(&body).unwrap_err();
        assert!(err.to_string().contains("12a45"), "{err}");

        // Multi-byte text is rejected before any field is sliced.
        let mut body = b"D0".to_vec();
        body.extend_from_slice("é".as_bytes());
        body.extend(std::iter::repeat(b'0').take(SAMPLES * FIELD_WIDTH - 2));
        let err = read.interpret(&body).unwrap_err();
        assert!(err.to_string().contains("not ASCII"), "{err}");
    }

    #[test]
    fn identity_reply() {
        let reply = HunterLabDriver::default()
            .identify()
            .interpret(b"I0MiniScan XE Plus,3.20,MS12345")
            .unwrap();
        let Reply::Identity(info) = reply else { panic!("expected identity") };
        assert_eq!(info.model, "MiniScan XE Plus");
        assert_eq!(info.serial_number, "MS12345");
    }

    #[test]
    fn spectrum_fields() {
        let mut body = b"D0".to_vec();
        for _ in 0..SAMPLES {
            body.extend_from_slice(b"08000");
        }
        let cmds = HunterLabDriver::default()
            .measure(&MeasurementSettings::default())
            .unwrap();
        let Reply::Spectrum(refl) = cmds[1].interpret(&body).unwrap() else {
            panic!("expected spectrum")
        };
        assert_eq!(refl.len(), 31);
        assert!(refl.values().iter().all(|v| (v - 0.8).abs() < 1e-12));
    }

    #[test]
    fn checksum_status_is_recoverable() {
        let err = HunterLabDriver::default()
            .identify()
            .interpret(b"I5")
            .unwrap_err();
        assert!(matches!(err, SpectroError::Framing(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn standardization_required() {
        let cmds = HunterLabDriver::default()
            .calibrate(CalibrationStep::White)
            .unwrap();
        match cmds[0].interpret(b"W3") {
            Err(SpectroError::Instrument { code, message }) => {
                assert_eq!(code, "3");
                assert_eq!(message, "standardization required");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

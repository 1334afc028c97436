//! Vendor spectrophotometer drivers.
//!
//! A driver carries protocol knowledge only: how to build the command
//! sequences for identification, calibration and measurement, how to decode
//! the vendor's status codes, and how to pull spectral data out of a reply.
//! Scheduling, framing, timeouts and retries belong to the shared
//! [`Spectrophotometer`](crate::protocol::Spectrophotometer) session.
//!
//! | Driver | Instrument family | Spectral range |
//! |--------|-------------------|----------------|
//! | [`xrite::XRiteDriver`] | X-Rite SP series | 400-700 nm / 10 |
//! | [`minolta::MinoltaDriver`] | Konica Minolta CM series | 360-740 nm / 10 |
//! | [`gretag::GretagDriver`] | GretagMacbeth Spectrolino | 380-730 nm / 10 |
//! | [`hunterlab::HunterLabDriver`] | HunterLab MiniScan | 400-700 nm / 10 |
//! | [`datacolor::DatacolorDriver`] | Datacolor SF series | 360-700 nm / 10 |

pub mod datacolor;
pub mod gretag;
pub mod hunterlab;
pub mod minolta;
pub mod registry;
pub mod simulator;
pub mod xrite;

pub use registry::DriverKind;

use crate::error::{SpectroError, SpectroResult};
use crate::protocol::command::BoxedCommand;
use crate::protocol::serial::SerialSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Specular component handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecularMode {
    /// Specular component included (SCI).
    Included,
    /// Specular component excluded (SCE).
    Excluded,
}

impl fmt::Display for SpecularMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SpecularMode::Included => "SCI",
            SpecularMode::Excluded => "SCE",
        })
    }
}

impl FromStr for SpecularMode {
    type Err = SpectroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sci" | "included" | "i" => Ok(SpecularMode::Included),
            "sce" | "excluded" | "e" => Ok(SpecularMode::Excluded),
            other => Err(SpectroError::Unsupported(format!("specular mode '{other}'"))),
        }
    }
}

/// Measurement aperture size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aperture {
    /// Large area view.
    Large,
    /// Medium area view.
    Medium,
    /// Small area view.
    Small,
}

impl fmt::Display for Aperture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Aperture::Large => "LAV",
            Aperture::Medium => "MAV",
            Aperture::Small => "SAV",
        })
    }
}

impl FromStr for Aperture {
    type Err = SpectroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lav" | "large" | "l" => Ok(Aperture::Large),
            "mav" | "medium" | "m" => Ok(Aperture::Medium),
            "sav" | "small" | "s" => Ok(Aperture::Small),
            other => Err(SpectroError::Unsupported(format!("aperture '{other}'"))),
        }
    }
}

/// Calibration steps an instrument may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationStep {
    /// Calibrate on the white reference tile.
    White,
    /// Calibrate on the black trap (zero calibration).
    Black,
}

impl fmt::Display for CalibrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CalibrationStep::White => "white",
            CalibrationStep::Black => "black",
        })
    }
}

/// What a driver's instrument can do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// First reported wavelength in nm.
    pub start_nm: f64,
    /// Last reported wavelength in nm.
    pub end_nm: f64,
    /// Wavelength interval in nm.
    pub interval_nm: f64,
    /// Selectable specular modes. Empty for fixed-geometry instruments.
    pub specular_modes: Vec<SpecularMode>,
    /// Selectable apertures.
    pub apertures: Vec<Aperture>,
    /// Whether a black (zero) calibration is available.
    pub black_calibration: bool,
    /// Largest accepted averaging count.
    pub max_averaging: u8,
}

impl Capabilities {
    /// Number of spectral samples per measurement.
    pub fn sample_count(&self) -> usize {
        ((self.end_nm - self.start_nm) / self.interval_nm).round() as usize + 1
    }
}

/// Per-measurement instrument settings.
///
/// `None` leaves the instrument's current setting unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementSettings {
    /// Specular component handling.
    pub specular: Option<SpecularMode>,
    /// Aperture.
    pub aperture: Option<Aperture>,
    /// Number of flashes averaged into one reading.
    pub averaging: u8,
}

impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            specular: None,
            aperture: None,
            averaging: 1,
        }
    }
}

impl MeasurementSettings {
    /// Select a specular mode.
    pub fn with_specular(mut self, specular: SpecularMode) -> Self {
        self.specular = Some(specular);
        self
    }

    /// Select an aperture.
    pub fn with_aperture(mut self, aperture: Aperture) -> Self {
        self.aperture = Some(aperture);
        self
    }

    /// Set the averaging count.
    pub fn with_averaging(mut self, averaging: u8) -> Self {
        self.averaging = averaging;
        self
    }
}

/// Protocol knowledge for one instrument family.
pub trait SpectroDriver: Send + Sync + fmt::Debug {
    /// Registry entry for this driver.
    fn kind(&self) -> DriverKind;

    /// Manufacturer name.
    fn vendor(&self) -> &'static str;

    /// Instrument model this driver instance talks to.
    fn model(&self) -> &str;

    /// Instrument capabilities.
    fn capabilities(&self) -> Capabilities;

    /// Serial line parameters.
    fn serial_settings(&self) -> SerialSettings;

    /// Command that makes the instrument identify itself. Replies with
    /// [`Reply::Identity`](crate::protocol::Reply::Identity).
    fn identify(&self) -> BoxedCommand;

    /// Commands performing one calibration step.
    fn calibrate(&self, step: CalibrationStep) -> SpectroResult<Vec<BoxedCommand>>;

    /// Commands taking one measurement. The last reply carries the spectrum.
    fn measure(&self, settings: &MeasurementSettings) -> SpectroResult<Vec<BoxedCommand>>;

    /// Reject settings the instrument cannot honour.
    fn validate(&self, settings: &MeasurementSettings) -> SpectroResult<()> {
        let caps = self.capabilities();
        if let Some(specular) = settings.specular {
            if !caps.specular_modes.contains(&specular) {
                return Err(SpectroError::Unsupported(format!(
                    "{} {} has no {specular} mode",
                    self.vendor(),
                    self.model()
                )));
            }
        }
        if let Some(aperture) = settings.aperture {
            if !caps.apertures.contains(&aperture) {
                return Err(SpectroError::Unsupported(format!(
                    "{} {} has no {aperture} aperture",
                    self.vendor(),
                    self.model()
                )));
            }
        }
        if settings.averaging == 0 || settings.averaging > caps.max_averaging {
            return Err(SpectroError::Unsupported(format!(
                "averaging {} outside 1..={}",
                settings.averaging, caps.max_averaging
            )));
        }
        Ok(())
    }

    /// Error for a calibration step the instrument lacks.
    fn unsupported_calibration(&self, step: CalibrationStep) -> SpectroError {
        SpectroError::Unsupported(format!(
            "{} {} has no {step} calibration",
            self.vendor(),
            self.model()
        ))
    }
}

/// Parse a fixed-width field of decimal digits as a reflectance in 0.01 % units.
pub(crate) fn hundredths_of_percent(command: &str, field: &str) -> SpectroResult<f64> {
    let raw: u32 = field
        .trim()
        .parse()
        .map_err(|_| SpectroError::parse(command, format!("bad reflectance field '{field}'")))?;
    Ok(f64::from(raw) / 10_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes_and_apertures() {
        assert_eq!("SCI".parse::<SpecularMode>().unwrap(), SpecularMode::Included);
        assert_eq!("excluded".parse::<SpecularMode>().unwrap(), SpecularMode::Excluded);
        assert_eq!("sav".parse::<Aperture>().unwrap(), Aperture::Small);
        assert!("huge".parse::<Aperture>().is_err());
    }

    #[test]
    fn sample_count_from_range() {
        let caps = Capabilities {
            start_nm: 400.0,
            end_nm: 700.0,
            interval_nm: 10.0,
            specular_modes: vec![],
            apertures: vec![],
            black_calibration: false,
            max_averaging: 1,
        };
        assert_eq!(caps.sample_count(), 31);
    }

    #[test]
    fn settings_builder() {
        let s = MeasurementSettings::default()
            .with_specular(SpecularMode::Excluded)
            .with_aperture(Aperture::Small)
            .with_averaging(3);
        assert_eq!(s.specular, Some(SpecularMode::Excluded));
        assert_eq!(s.aperture, Some(Aperture::Small));
        assert_eq!(s.averaging, 3);
    }

    #[test]
    fn hundredths_parse() {
        assert!((hundredths_of_percent("RD", "05234").unwrap() - 0.5234).abs() < 1e-12);
        assert!(hundredths_of_percent("RD", "5x").is_err());
    }
}

//! Driver lookup by configuration name.
//!
//! ```rust
//! use spectro_daq::drivers::{DriverKind, SpectroDriver};
//!
//! let kind: DriverKind = "x-rite".parse()?;
//! let driver = kind.create(None);
//! assert_eq!(driver.vendor(), "X-Rite");
//! assert_eq!(driver.model(), "SP64");
//! # Ok::<(), spectro_daq::SpectroError>(())
//! ```

use super::datacolor::DatacolorDriver;
use super::gretag::GretagDriver;
use super::hunterlab::HunterLabDriver;
use super::minolta::MinoltaDriver;
use super::xrite::XRiteDriver;
use super::SpectroDriver;
use crate::error::SpectroError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Known drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// X-Rite SP series.
    #[serde(rename = "xrite")]
    XRite,
    /// Konica Minolta CM series.
    Minolta,
    /// GretagMacbeth Spectrolino.
    Gretag,
    /// HunterLab MiniScan.
    #[serde(rename = "hunterlab")]
    HunterLab,
    /// Datacolor SF series.
    Datacolor,
}

impl DriverKind {
    /// Every known driver.
    pub const ALL: [DriverKind; 5] = [
        DriverKind::XRite,
        DriverKind::Minolta,
        DriverKind::Gretag,
        DriverKind::HunterLab,
        DriverKind::Datacolor,
    ];

    /// Every known driver.
    pub fn all() -> &'static [DriverKind] {
        &Self::ALL
    }

    /// Configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::XRite => "xrite",
            DriverKind::Minolta => "minolta",
            DriverKind::Gretag => "gretag",
            DriverKind::HunterLab => "hunterlab",
            DriverKind::Datacolor => "datacolor",
        }
    }

    /// Build a driver, for `model` or the family's default model.
    pub fn create(&self, model: Option<&str>) -> Box<dyn SpectroDriver> {
        match (self, model) {
            (DriverKind::XRite, Some(m)) => Box::new(XRiteDriver::new(m)),
            (DriverKind::XRite, None) => Box::new(XRiteDriver::default()),
            (DriverKind::Minolta, Some(m)) => Box::new(MinoltaDriver::new(m)),
            (DriverKind::Minolta, None) => Box::new(MinoltaDriver::default()),
            (DriverKind::Gretag, Some(m)) => Box::new(GretagDriver::new(m)),
            (DriverKind::Gretag, None) => Box::new(GretagDriver::default()),
            (DriverKind::HunterLab, Some(m)) => Box::new(HunterLabDriver::new(m)),
            (DriverKind::HunterLab, None) => Box::new(HunterLabDriver::default()),
            (DriverKind::Datacolor, Some(m)) => Box::new(DatacolorDriver::new(m)),
            (DriverKind::Datacolor, None) => Box::new(DatacolorDriver::default()),
        }
    }

    /// Build a shareable driver.
    pub fn create_shared(&self, model: Option<&str>) -> Arc<dyn SpectroDriver> {
        Arc::from(self.create(model))
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DriverKind {
    type Err = SpectroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "xrite" => Ok(DriverKind::XRite),
            "minolta" | "konicaminolta" => Ok(DriverKind::Minolta),
            "gretag" | "gretagmacbeth" => Ok(DriverKind::Gretag),
            "hunterlab" => Ok(DriverKind::HunterLab),
            "datacolor" => Ok(DriverKind::Datacolor),
            _ => Err(SpectroError::Configuration(format!(
                "unknown driver '{s}' (expected one of: {})",
                DriverKind::ALL.map(|k| k.name()).join(", ")
            ))),
        }
    }
}

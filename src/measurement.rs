//! Measurement records and reflectance file I/O.
//!
//! Reflectance curves are exchanged as two-column CSV files:
//!
//! ```text
//! wavelength_nm,reflectance
//! 400,0.0512
//! 410,0.0534
//! ```
//!
//! Reflectance is stored as a factor (1.0 = perfect diffuser).

use crate::colorimetry::{
    reflectance_to_lab, reflectance_to_xyz, ColorimetricConditions, Lab, Reflectance, Xyz,
};
use crate::drivers::MeasurementSettings;
use crate::error::{SpectroError, SpectroResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use uuid::Uuid;

/// One spectral reading taken by an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Unique id.
    pub id: Uuid,
    /// Configured instrument id.
    pub instrument: String,
    /// Instrument model.
    pub model: String,
    /// Acquisition time.
    pub taken_at: DateTime<Utc>,
    /// Settings the reading was taken with.
    pub settings: MeasurementSettings,
    /// Measured curve.
    pub reflectance: Reflectance,
}

impl Measurement {
    /// Stamp a new measurement with a fresh id and the current time.
    pub fn new(
        instrument: impl Into<String>,
        model: impl Into<String>,
        settings: MeasurementSettings,
        reflectance: Reflectance,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument: instrument.into(),
            model: model.into(),
            taken_at: Utc::now(),
            settings,
            reflectance,
        }
    }

    /// Tristimulus values under `conditions`.
    pub fn xyz(&self, conditions: ColorimetricConditions) -> Xyz {
        reflectance_to_xyz(&self.reflectance, conditions)
    }

    /// CIELAB under `conditions`.
    pub fn lab(&self, conditions: ColorimetricConditions) -> Lab {
        reflectance_to_lab(&self.reflectance, conditions)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    wavelength_nm: f64,
    reflectance: f64,
}

/// Write `reflectance` as CSV.
pub fn write_reflectance_csv<W: Write>(writer: W, reflectance: &Reflectance) -> SpectroResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for (wavelength_nm, reflectance) in reflectance.samples() {
        csv.serialize(Row {
            wavelength_nm,
            reflectance,
        })?;
    }
    csv.flush()?;
    Ok(())
}

/// Read a reflectance curve from CSV.
///
/// Rows must be evenly spaced and ascending in wavelength.
pub fn read_reflectance_csv<R: Read>(reader: R) -> SpectroResult<Reflectance> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut pairs = Vec::new();
    for row in csv.deserialize() {
        let row: Row = row?;
        pairs.push((row.wavelength_nm, row.reflectance));
    }
    if pairs.is_empty() {
        return Err(SpectroError::InvalidSpectrum("CSV contains no rows".into()));
    }
    Reflectance::from_pairs(&pairs)
}

/// Write `reflectance` to a CSV file.
pub fn save_reflectance_csv(path: impl AsRef<Path>, reflectance: &Reflectance) -> SpectroResult<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_reflectance_csv(file, reflectance)?;
    tracing::debug!(path = %path.as_ref().display(), samples = reflectance.len(), "Wrote reflectance CSV");
    Ok(())
}

/// Read a reflectance curve from a CSV file.
pub fn load_reflectance_csv(path: impl AsRef<Path>) -> SpectroResult<Reflectance> {
    let file = std::fs::File::open(path.as_ref())?;
    read_reflectance_csv(file)
}

//! Spectral reflectance curves sampled on an even wavelength grid.

use crate::error::{SpectroError, SpectroResult};
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that sample wavelengths are evenly spaced.
const SPACING_TOLERANCE_NM: f64 = 1e-6;

/// A reflectance curve sampled at fixed wavelength intervals.
///
/// Values are reflectance factors: 1.0 is the perfect diffuser. Instruments
/// that report percent go through [`Reflectance::from_percent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawReflectance")]
pub struct Reflectance {
    start_nm: f64,
    interval_nm: f64,
    values: Vec<f64>,
}

/// Wire shape of [`Reflectance`]; converted through [`Reflectance::new`].
#[derive(Deserialize)]
struct RawReflectance {
    start_nm: f64,
    interval_nm: f64,
    values: Vec<f64>,
}

impl TryFrom<RawReflectance> for Reflectance {
    type Error = SpectroError;

    fn try_from(raw: RawReflectance) -> SpectroResult<Self> {
        Self::new(raw.start_nm, raw.interval_nm, raw.values)
    }
}

impl Reflectance {
    /// Create a curve starting at `start_nm` with `interval_nm` spacing.
    ///
    /// # Errors
    /// `InvalidSpectrum` if `values` is empty, the interval is not a positive
    /// finite number, or any value is not finite.
    pub fn new(start_nm: f64, interval_nm: f64, values: Vec<f64>) -> SpectroResult<Self> {
        if values.is_empty() {
            return Err(SpectroError::InvalidSpectrum("no samples".into()));
        }
        if !start_nm.is_finite() {
            return Err(SpectroError::InvalidSpectrum(format!(
                "start wavelength {start_nm} is not finite"
            )));
        }
        if !(interval_nm.is_finite() && interval_nm > 0.0) {
            return Err(SpectroError::InvalidSpectrum(format!(
                "interval {interval_nm} nm must be positive"
            )));
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(SpectroError::InvalidSpectrum(format!(
                "sample {idx} is not finite"
            )));
        }

        Ok(Self {
            start_nm,
            interval_nm,
            values,
        })
    }

    /// Create a curve from percent values (100.0 = perfect diffuser).
    pub fn from_percent(start_nm: f64, interval_nm: f64, percent: &[f64]) -> SpectroResult<Self> {
        Self::new(
            start_nm,
            interval_nm,
            percent.iter().map(|p| p / 100.0).collect(),
        )
    }

    /// Create a curve from `(wavelength_nm, value)` samples.
    ///
    /// Wavelengths must be ascending and evenly spaced.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> SpectroResult<Self> {
        match pairs {
            [] => Err(SpectroError::InvalidSpectrum("no samples".into())),
            [(nm, value)] => Self::new(*nm, 1.0, vec![*value]),
            [(first, _), (second, _), ..] => {
                let interval = second - first;
                for (i, window) in pairs.windows(2).enumerate() {
                    let step = window[1].0 - window[0].0;
                    if (step - interval).abs() > SPACING_TOLERANCE_NM {
                        return Err(SpectroError::InvalidSpectrum(format!(
                            "uneven spacing at sample {}: {step} nm vs {interval} nm",
                            i + 1
                        )));
                    }
                }
                Self::new(*first, interval, pairs.iter().map(|(_, v)| *v).collect())
            }
        }
    }

    /// First sampled wavelength.
    pub fn start_nm(&self) -> f64 {
        self.start_nm
    }

    /// Sampling interval.
    pub fn interval_nm(&self) -> f64 {
        self.interval_nm
    }

    /// Last sampled wavelength.
    pub fn end_nm(&self) -> f64 {
        self.start_nm + self.interval_nm * (self.values.len() - 1) as f64
    }

    /// Raw samples.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false: construction rejects empty curves.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sampled wavelengths, in ascending order.
    pub fn wavelengths(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.values.len()).map(move |i| self.start_nm + self.interval_nm * i as f64)
    }

    /// `(wavelength, value)` pairs.
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.wavelengths().zip(self.values.iter().copied())
    }

    /// Reflectance at an arbitrary wavelength.
    ///
    /// Linear interpolation inside the measured range. Outside it the nearest
    /// end value is repeated.
    pub fn value_at(&self, nm: f64) -> f64 {
        let last = self.values.len() - 1;
        if nm <= self.start_nm {
            return self.values[0];
        }
        if nm >= self.end_nm() {
            return self.values[last];
        }

        let pos = (nm - self.start_nm) / self.interval_nm;
        let lower = pos.floor() as usize;
        let frac = pos - lower as f64;
        if lower >= last || frac < f64::EPSILON {
            return self.values[lower.min(last)];
        }
        self.values[lower] + (self.values[lower + 1] - self.values[lower]) * frac
    }

    /// Resample onto another grid.
    pub fn resample(&self, start_nm: f64, interval_nm: f64, count: usize) -> SpectroResult<Self> {
        let values = (0..count)
            .map(|i| self.value_at(start_nm + interval_nm * i as f64))
            .collect();
        Self::new(start_nm, interval_nm, values)
    }

    /// Values scaled to percent.
    pub fn to_percent(&self) -> Vec<f64> {
        self.values.iter().map(|v| v * 100.0).collect()
    }
}

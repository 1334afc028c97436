//! Reflectance to CIE XYZ integration.

use super::illuminant::Illuminant;
use super::observer::Observer;
use super::spectrum::Reflectance;
use serde::{Deserialize, Serialize};

/// Integration grid: 380..=780 nm at 10 nm.
const GRID_START_NM: f64 = 380.0;
const GRID_INTERVAL_NM: f64 = 10.0;
const GRID_POINTS: usize = 41;

/// CIE 1931 tristimulus values, scaled so the perfect diffuser has Y = 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Xyz {
    /// X
    pub x: f64,
    /// Y (luminance factor)
    pub y: f64,
    /// Z
    pub z: f64,
}

/// CIE xy chromaticity coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Chromaticity {
    /// x
    pub x: f64,
    /// y
    pub y: f64,
}

impl Xyz {
    /// Create from components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// xy chromaticity, or `None` for black (X + Y + Z = 0).
    pub fn chromaticity(&self) -> Option<Chromaticity> {
        let sum = self.x + self.y + self.z;
        if sum.abs() < f64::EPSILON {
            return None;
        }
        Some(Chromaticity {
            x: self.x / sum,
            y: self.y / sum,
        })
    }
}

/// Illuminant/observer pair under which colorimetric values are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ColorimetricConditions {
    /// Reference illuminant.
    pub illuminant: Illuminant,
    /// Standard observer.
    pub observer: Observer,
}

impl ColorimetricConditions {
    /// Create a condition pair.
    pub const fn new(illuminant: Illuminant, observer: Observer) -> Self {
        Self {
            illuminant,
            observer,
        }
    }
}

impl std::fmt::Display for ColorimetricConditions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.illuminant, self.observer)
    }
}

/// Integrate a reflectance curve into XYZ under the given conditions.
///
/// `X = k Σ S(λ) R(λ) x̄(λ)` with `k = 100 / Σ S(λ) ȳ(λ)`. The curve is
/// interpolated onto the 10 nm grid; wavelengths outside the measured range
/// repeat the nearest measured value.
pub fn reflectance_to_xyz(reflectance: &Reflectance, conditions: ColorimetricConditions) -> Xyz {
    integrate(conditions, |nm| reflectance.value_at(nm))
}

/// XYZ of the perfect diffuser under the given conditions.
pub fn white_point(conditions: ColorimetricConditions) -> Xyz {
    integrate(conditions, |_| 1.0)
}

fn integrate(conditions: ColorimetricConditions, reflectance: impl Fn(f64) -> f64) -> Xyz {
    let mut sum = [0.0_f64; 3];
    let mut norm = 0.0_f64;

    for i in 0..GRID_POINTS {
        let nm = GRID_START_NM + GRID_INTERVAL_NM * i as f64;
        let s = conditions.illuminant.spd(nm);
        let [xb, yb, zb] = conditions.observer.cmf(nm);
        let r = reflectance(nm);

        sum[0] += s * r * xb;
        sum[1] += s * r * yb;
        sum[2] += s * r * zb;
        norm += s * yb;
    }

    let k = 100.0 / norm;
    Xyz::new(k * sum[0], k * sum[1], k * sum[2])
}

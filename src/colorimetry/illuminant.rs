//! CIE standard illuminants.
//!
//! Relative spectral power distributions are computed rather than tabulated:
//! illuminant A from Planck's law, the D series from the CIE daylight basis
//! functions S0, S1 and S2.

#![allow(clippy::unreadable_literal)]

use crate::error::{SpectroError, SpectroResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Second radiation constant used by the 1931 definition of illuminant A (m·K).
const C2_A: f64 = 1.435e-2;

/// Ratio between the current and historical values of c2, applied to the
/// nominal D-series temperatures.
const DAYLIGHT_CCT_CORRECTION: f64 = 1.4388 / 1.4380;

/// Standard illuminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Illuminant {
    /// Incandescent tungsten, 2856 K.
    A,
    /// Horizon daylight, 5003 K.
    D50,
    /// Mid-morning daylight, 5503 K.
    D55,
    /// Average daylight, 6504 K.
    #[default]
    D65,
    /// North sky daylight, 7504 K.
    D75,
    /// Equal-energy radiator.
    E,
}

impl Illuminant {
    /// All supported illuminants.
    pub const ALL: [Illuminant; 6] = [
        Illuminant::A,
        Illuminant::D50,
        Illuminant::D55,
        Illuminant::D65,
        Illuminant::D75,
        Illuminant::E,
    ];

    /// Relative spectral power at `nm`.
    pub fn spd(&self, nm: f64) -> f64 {
        match self {
            Illuminant::A => planck_a(nm),
            Illuminant::E => 100.0,
            Illuminant::D50 | Illuminant::D55 | Illuminant::D65 | Illuminant::D75 => {
                let cct = self.nominal_cct() * DAYLIGHT_CCT_CORRECTION;
                // Nominal temperatures are inside the model's validity range.
                daylight_at(daylight_chromaticity(cct).unwrap_or((0.31271, 0.32902)), nm)
            }
        }
    }

    /// Nominal correlated color temperature in kelvin.
    pub fn nominal_cct(&self) -> f64 {
        match self {
            Illuminant::A => 2856.0,
            Illuminant::D50 => 5000.0,
            Illuminant::D55 => 5500.0,
            Illuminant::D65 => 6500.0,
            Illuminant::D75 => 7500.0,
            Illuminant::E => 5455.0,
        }
    }

    /// Daylight relative SPD at an arbitrary CCT, sampled at 10 nm over 380..=780.
    ///
    /// # Errors
    /// `Unsupported` outside 4000..=25000 K.
    pub fn daylight_spd(cct: f64) -> SpectroResult<Vec<(f64, f64)>> {
        let xy = daylight_chromaticity(cct)?;
        Ok((0..DAYLIGHT_BASIS.len())
            .map(|i| {
                let nm = DAYLIGHT_START_NM + DAYLIGHT_INTERVAL_NM * i as f64;
                (nm, daylight_at(xy, nm))
            })
            .collect())
    }
}

impl fmt::Display for Illuminant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Illuminant::A => "A",
            Illuminant::D50 => "D50",
            Illuminant::D55 => "D55",
            Illuminant::D65 => "D65",
            Illuminant::D75 => "D75",
            Illuminant::E => "E",
        };
        f.write_str(name)
    }
}

impl FromStr for Illuminant {
    type Err = SpectroError;

    fn from_str(s: &str) -> SpectroResult<Self> {
        Illuminant::ALL
            .into_iter()
            .find(|ill| ill.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                SpectroError::Configuration(format!(
                    "Unknown illuminant '{s}'. Expected one of A, D50, D55, D65, D75, E"
                ))
            })
    }
}

fn planck_a(nm: f64) -> f64 {
    let lambda = nm * 1e-9;
    let ref_lambda = 560e-9;
    let t = 2848.0;
    100.0 * (ref_lambda / lambda).powi(5) * ((C2_A / (ref_lambda * t)).exp() - 1.0)
        / ((C2_A / (lambda * t)).exp() - 1.0)
}

fn daylight_chromaticity(cct: f64) -> SpectroResult<(f64, f64)> {
    let x = if (4000.0..=7000.0).contains(&cct) {
        -4.6070e9 / cct.powi(3) + 2.9678e6 / cct.powi(2) + 0.09911e3 / cct + 0.244063
    } else if (7000.0..=25000.0).contains(&cct) {
        -2.0064e9 / cct.powi(3) + 1.9018e6 / cct.powi(2) + 0.24748e3 / cct + 0.237040
    } else {
        return Err(SpectroError::Unsupported(format!(
            "daylight model covers 4000-25000 K, got {cct} K"
        )));
    };
    let y = -3.000 * x * x + 2.870 * x - 0.275;
    Ok((x, y))
}

fn daylight_at((x, y): (f64, f64), nm: f64) -> f64 {
    let m = 0.0241 + 0.2562 * x - 0.7341 * y;
    let m1 = (-1.3515 - 1.7703 * x + 5.9114 * y) / m;
    let m2 = (0.0300 - 31.4424 * x + 30.0717 * y) / m;
    let [s0, s1, s2] = daylight_basis(nm);
    s0 + m1 * s1 + m2 * s2
}

fn daylight_basis(nm: f64) -> [f64; 3] {
    let last = DAYLIGHT_BASIS.len() - 1;
    let pos = ((nm - DAYLIGHT_START_NM) / DAYLIGHT_INTERVAL_NM).clamp(0.0, last as f64);
    let lower = pos.floor() as usize;
    let upper = (lower + 1).min(last);
    let frac = pos - lower as f64;
    let (a, b) = (DAYLIGHT_BASIS[lower], DAYLIGHT_BASIS[upper]);
    [
        a[0] + (b[0] - a[0]) * frac,
        a[1] + (b[1] - a[1]) * frac,
        a[2] + (b[2] - a[2]) * frac,
    ]
}

const DAYLIGHT_START_NM: f64 = 380.0;
const DAYLIGHT_INTERVAL_NM: f64 = 10.0;

// S0, S1, S2 daylight components, 380-780 nm at 10 nm.
const DAYLIGHT_BASIS: [[f64; 3]; 41] = [
    [63.4, 38.5, 3.0],
    [65.8, 35.0, 1.2],
    [94.8, 43.4, -1.1],
    [104.8, 46.3, -0.5],
    [105.9, 43.9, -0.7],
    [96.8, 37.1, -1.2],
    [113.9, 36.7, -2.6],
    [125.6, 35.9, -2.9],
    [125.5, 32.6, -2.8],
    [121.3, 27.9, -2.6],
    [121.3, 24.3, -2.6],
    [113.5, 20.1, -1.8],
    [113.1, 16.2, -1.5],
    [110.8, 13.2, -1.3],
    [106.5, 8.6, -1.2],
    [108.8, 6.1, -1.0],
    [105.3, 4.2, -0.5],
    [104.4, 1.9, -0.3],
    [100.0, 0.0, 0.0],
    [96.0, -1.6, 0.2],
    [95.1, -3.5, 0.5],
    [89.1, -3.5, 2.1],
    [90.5, -5.8, 3.2],
    [90.3, -7.2, 4.1],
    [88.4, -8.6, 4.7],
    [84.0, -9.5, 5.1],
    [85.1, -10.9, 6.7],
    [81.9, -10.7, 7.3],
    [82.6, -12.0, 8.6],
    [84.9, -14.0, 9.8],
    [81.3, -13.6, 10.2],
    [71.9, -12.0, 8.3],
    [74.3, -13.3, 9.6],
    [76.4, -12.9, 8.5],
    [63.3, -10.6, 7.0],
    [71.7, -11.6, 7.6],
    [77.0, -12.2, 8.0],
    [65.2, -10.2, 6.7],
    [47.7, -7.8, 5.2],
    [68.6, -11.2, 7.4],
    [65.0, -10.4, 6.8],
];

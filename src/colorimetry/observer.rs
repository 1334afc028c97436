//! CIE standard colorimetric observers.

#![allow(clippy::unreadable_literal)]
#![allow(clippy::excessive_precision)]

use crate::error::{SpectroError, SpectroResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Standard observer (colour-matching functions) used for tristimulus integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Observer {
    /// CIE 1931 2° standard observer.
    #[default]
    #[serde(rename = "2")]
    Cie1931TwoDegree,
    /// CIE 1964 10° supplementary standard observer.
    #[serde(rename = "10")]
    Cie1964TenDegree,
}

struct CmfTable {
    start_nm: f64,
    interval_nm: f64,
    x: &'static [f64],
    y: &'static [f64],
    z: &'static [f64],
}

impl CmfTable {
    fn lookup(&self, nm: f64) -> [f64; 3] {
        let last = self.x.len() - 1;
        let end_nm = self.start_nm + self.interval_nm * last as f64;
        if nm < self.start_nm || nm > end_nm {
            return [0.0; 3];
        }

        let pos = (nm - self.start_nm) / self.interval_nm;
        let lower = (pos.floor() as usize).min(last);
        let upper = (lower + 1).min(last);
        let frac = pos - lower as f64;
        let lerp = |t: &[f64]| t[lower] + (t[upper] - t[lower]) * frac;

        [lerp(self.x), lerp(self.y), lerp(self.z)]
    }
}

impl Observer {
    /// Colour-matching functions `[x̄, ȳ, z̄]` at `nm`.
    ///
    /// Linear interpolation between tabulated values; zero outside 380..=780 nm.
    pub fn cmf(&self, nm: f64) -> [f64; 3] {
        self.table().lookup(nm)
    }

    /// Short label ("2°" / "10°").
    pub fn label(&self) -> &'static str {
        match self {
            Observer::Cie1931TwoDegree => "2°",
            Observer::Cie1964TenDegree => "10°",
        }
    }

    fn table(&self) -> &'static CmfTable {
        match self {
            Observer::Cie1931TwoDegree => &CIE1931_2,
            Observer::Cie1964TenDegree => &CIE1964_10,
        }
    }
}

impl fmt::Display for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Observer {
    type Err = SpectroError;

    fn from_str(s: &str) -> SpectroResult<Self> {
        match s.trim().to_lowercase().trim_end_matches('°') {
            "2" | "2deg" | "cie1931" => Ok(Observer::Cie1931TwoDegree),
            "10" | "10deg" | "cie1964" => Ok(Observer::Cie1964TenDegree),
            other => Err(SpectroError::Configuration(format!(
                "Unknown observer '{other}'. Expected 2 or 10"
            ))),
        }
    }
}

/// Accepts `"2"`, `"10"` or the bare numbers, which is how environment
/// overrides arrive.
impl<'de> Deserialize<'de> for Observer {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Degrees {
            Number(u64),
            Text(String),
        }

        match Degrees::deserialize(deserializer)? {
            Degrees::Number(n) => n.to_string().parse(),
            Degrees::Text(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

// CIE 1931 2°, 380-780 nm at 5 nm.
static CIE1931_2: CmfTable = CmfTable {
    start_nm: 380.0,
    interval_nm: 5.0,
    x: &[
        0.001368, 0.002236, 0.004243, 0.007650, 0.014310, 0.023190, 0.043510, 0.077630, 0.134380,
        0.214770, 0.283900, 0.328500, 0.348280, 0.348060, 0.336200, 0.318700, 0.290800, 0.251100,
        0.195360, 0.142100, 0.095640, 0.058010, 0.032010, 0.014700, 0.004900, 0.002400, 0.009300,
        0.029100, 0.063270, 0.109600, 0.165500, 0.225750, 0.290400, 0.359700, 0.433450, 0.512050,
        0.594500, 0.678400, 0.762100, 0.842500, 0.916300, 0.978600, 1.026300, 1.056700, 1.062200,
        1.045600, 1.002600, 0.938400, 0.854450, 0.751400, 0.642400, 0.541900, 0.447900, 0.360800,
        0.283500, 0.218700, 0.164900, 0.121200, 0.087400, 0.063600, 0.046770, 0.032900, 0.022700,
        0.015840, 0.011359, 0.008111, 0.005790, 0.004109, 0.002899, 0.002049, 0.001440, 0.001000,
        0.000690, 0.000476, 0.000332, 0.000235, 0.000166, 0.000117, 0.000083, 0.000059, 0.000042,
    ],
    y: &[
        0.000039, 0.000064, 0.000120, 0.000217, 0.000396, 0.000640, 0.001210, 0.002180, 0.004000,
        0.007300, 0.011600, 0.016840, 0.023000, 0.029800, 0.038000, 0.048000, 0.060000, 0.073900,
        0.090980, 0.112600, 0.139020, 0.169300, 0.208020, 0.258600, 0.323000, 0.407300, 0.503000,
        0.608200, 0.710000, 0.793200, 0.862000, 0.914850, 0.954000, 0.980300, 0.994950, 1.000000,
        0.995000, 0.978600, 0.952000, 0.915400, 0.870000, 0.816300, 0.757000, 0.694900, 0.631000,
        0.566800, 0.503000, 0.441200, 0.381000, 0.321000, 0.265000, 0.217000, 0.175000, 0.138200,
        0.107000, 0.081600, 0.061000, 0.044580, 0.032000, 0.023200, 0.017000, 0.011920, 0.008210,
        0.005723, 0.004102, 0.002929, 0.002091, 0.001484, 0.001047, 0.000740, 0.000520, 0.000361,
        0.000249, 0.000172, 0.000120, 0.000085, 0.000060, 0.000042, 0.000030, 0.000021, 0.000015,
    ],
    z: &[
        0.006450, 0.010550, 0.020050, 0.036210, 0.067850, 0.110200, 0.207400, 0.371300, 0.645600,
        1.039050, 1.385600, 1.622960, 1.747060, 1.782600, 1.772110, 1.744100, 1.669200, 1.528100,
        1.287640, 1.041900, 0.812950, 0.616200, 0.465180, 0.353300, 0.272000, 0.212300, 0.158200,
        0.111700, 0.078250, 0.057250, 0.042160, 0.029840, 0.020300, 0.013400, 0.008750, 0.005750,
        0.003900, 0.002750, 0.002100, 0.001800, 0.001650, 0.001400, 0.001100, 0.001000, 0.000800,
        0.000600, 0.000340, 0.000240, 0.000190, 0.000100, 0.000050, 0.000030, 0.000020, 0.000010,
        0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000,
        0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000,
        0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000,
    ],
};

// CIE 1964 10°, 380-780 nm at 10 nm.
static CIE1964_10: CmfTable = CmfTable {
    start_nm: 380.0,
    interval_nm: 10.0,
    x: &[
        0.000160, 0.002362, 0.019110, 0.084736, 0.204492, 0.314679, 0.383734, 0.370702, 0.302273,
        0.195618, 0.080507, 0.016172, 0.003816, 0.037465, 0.117749, 0.236491, 0.376772, 0.529826,
        0.705224, 0.878655, 1.014160, 1.118520, 1.123990, 1.030480, 0.856297, 0.647467, 0.431567,
        0.268329, 0.152568, 0.081261, 0.040851, 0.019941, 0.009577, 0.004553, 0.002175, 0.001045,
        0.000508, 0.000251, 0.000126, 0.000065, 0.000033,
    ],
    y: &[
        0.000017, 0.000253, 0.002004, 0.008756, 0.021391, 0.038676, 0.062077, 0.089456, 0.128201,
        0.185190, 0.253589, 0.339133, 0.460777, 0.606741, 0.761757, 0.875211, 0.961988, 0.991761,
        0.997340, 0.955552, 0.868934, 0.777405, 0.658341, 0.527963, 0.398057, 0.283493, 0.179828,
        0.107633, 0.060281, 0.031800, 0.015905, 0.007749, 0.003718, 0.001768, 0.000846, 0.000407,
        0.000199, 0.000098, 0.000050, 0.000025, 0.000013,
    ],
    z: &[
        0.000705, 0.010482, 0.086011, 0.389366, 0.972542, 1.553480, 1.967280, 1.994800, 1.745370,
        1.317560, 0.772125, 0.415254, 0.218502, 0.112044, 0.060709, 0.030451, 0.013676, 0.003988,
        0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000,
        0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000, 0.000000,
        0.000000, 0.000000, 0.000000, 0.000000, 0.000000,
    ],
};

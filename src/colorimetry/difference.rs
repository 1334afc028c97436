//! Color-difference metrics.
//!
//! - ΔE*ab (CIE 1976): Euclidean distance in CIELAB
//! - ΔE*94 (CIE 1994): chroma/hue weighted, graphic-arts or textiles parameters
//! - ΔE CMC(l:c): the textile industry's acceptability metric
//! - ΔE00 (CIEDE2000): CIE Technical Report 142-2001
//!
//! CIE94 and CMC are asymmetric: the first argument is the reference (standard).

#![allow(clippy::many_single_char_names)]

use super::lab::Lab;
use crate::error::{SpectroError, SpectroResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Parameter sets for CIE94.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cie94Application {
    /// kL = 1, K1 = 0.045, K2 = 0.015
    #[default]
    GraphicArts,
    /// kL = 2, K1 = 0.048, K2 = 0.014
    Textiles,
}

/// A color-difference formula with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "formula", rename_all = "snake_case")]
pub enum DeltaEFormula {
    /// CIE 1976.
    Cie76,
    /// CIE 1994.
    Cie94 {
        /// Weighting parameter set.
        application: Cie94Application,
    },
    /// CMC(l:c).
    Cmc {
        /// Lightness weight (2 for acceptability, 1 for perceptibility).
        l: f64,
        /// Chroma weight.
        c: f64,
    },
    /// CIEDE2000 with parametric factors.
    Ciede2000 {
        /// Lightness factor.
        kl: f64,
        /// Chroma factor.
        kc: f64,
        /// Hue factor.
        kh: f64,
    },
}

impl Default for DeltaEFormula {
    fn default() -> Self {
        DeltaEFormula::Ciede2000 {
            kl: 1.0,
            kc: 1.0,
            kh: 1.0,
        }
    }
}

impl FromStr for DeltaEFormula {
    type Err = SpectroError;

    fn from_str(s: &str) -> SpectroResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "76" | "cie76" | "de76" => Ok(DeltaEFormula::Cie76),
            "94" | "cie94" | "de94" => Ok(DeltaEFormula::Cie94 {
                application: Cie94Application::GraphicArts,
            }),
            "cie94-textiles" | "de94t" => Ok(DeltaEFormula::Cie94 {
                application: Cie94Application::Textiles,
            }),
            "cmc" | "cmc21" | "cmc2:1" => Ok(DeltaEFormula::Cmc { l: 2.0, c: 1.0 }),
            "cmc11" | "cmc1:1" => Ok(DeltaEFormula::Cmc { l: 1.0, c: 1.0 }),
            "2000" | "ciede2000" | "de2000" | "de00" => Ok(DeltaEFormula::default()),
            other => Err(SpectroError::Configuration(format!(
                "Unknown color-difference formula '{other}'"
            ))),
        }
    }
}

/// Difference between `reference` and `sample` under `formula`.
pub fn delta_e(reference: Lab, sample: Lab, formula: DeltaEFormula) -> f64 {
    match formula {
        DeltaEFormula::Cie76 => delta_e_76(reference, sample),
        DeltaEFormula::Cie94 { application } => delta_e_94(reference, sample, application),
        DeltaEFormula::Cmc { l, c } => delta_e_cmc(reference, sample, l, c),
        DeltaEFormula::Ciede2000 { kl, kc, kh } => delta_e_2000(reference, sample, kl, kc, kh),
    }
}

/// CIE 1976 ΔE*ab.
pub fn delta_e_76(reference: Lab, sample: Lab) -> f64 {
    let dl = sample.l - reference.l;
    let da = sample.a - reference.a;
    let db = sample.b - reference.b;
    (dl * dl + da * da + db * db).sqrt()
}

/// ΔH² from Δa, Δb and ΔC, floored at zero against rounding.
fn delta_h_squared(reference: Lab, sample: Lab, dc: f64) -> f64 {
    let da = sample.a - reference.a;
    let db = sample.b - reference.b;
    (da * da + db * db - dc * dc).max(0.0)
}

/// CIE 1994 ΔE*94.
pub fn delta_e_94(reference: Lab, sample: Lab, application: Cie94Application) -> f64 {
    let (kl, k1, k2) = match application {
        Cie94Application::GraphicArts => (1.0, 0.045, 0.015),
        Cie94Application::Textiles => (2.0, 0.048, 0.014),
    };

    let c1 = reference.chroma();
    let c2 = sample.chroma();
    let dl = sample.l - reference.l;
    let dc = c2 - c1;
    let dh2 = delta_h_squared(reference, sample, dc);

    let sc = 1.0 + k1 * c1;
    let sh = 1.0 + k2 * c1;

    ((dl / kl).powi(2) + (dc / sc).powi(2) + dh2 / (sh * sh)).sqrt()
}

/// CMC(l:c).
pub fn delta_e_cmc(reference: Lab, sample: Lab, l: f64, c: f64) -> f64 {
    let c1 = reference.chroma();
    let c2 = sample.chroma();
    let dl = sample.l - reference.l;
    let dc = c2 - c1;
    let dh2 = delta_h_squared(reference, sample, dc);

    let h1 = reference.to_lch().h;
    let sl = if reference.l < 16.0 {
        0.511
    } else {
        0.040975 * reference.l / (1.0 + 0.01765 * reference.l)
    };
    let sc = 0.0638 * c1 / (1.0 + 0.0131 * c1) + 0.638;
    let c1_4 = c1.powi(4);
    let f = (c1_4 / (c1_4 + 1900.0)).sqrt();
    let t = if (164.0..=345.0).contains(&h1) {
        0.56 + (0.2 * (h1 + 168.0).to_radians().cos()).abs()
    } else {
        0.36 + (0.4 * (h1 + 35.0).to_radians().cos()).abs()
    };
    let sh = sc * (f * t + 1.0 - f);

    ((dl / (l * sl)).powi(2) + (dc / (c * sc)).powi(2) + dh2 / (sh * sh)).sqrt()
}

/// CIEDE2000 ΔE00.
pub fn delta_e_2000(reference: Lab, sample: Lab, kl: f64, kc: f64, kh: f64) -> f64 {
    const POW25_7: f64 = 6_103_515_625.0; // 25^7

    let c1 = reference.chroma();
    let c2 = sample.chroma();
    let c_bar = (c1 + c2) / 2.0;
    let c_bar7 = c_bar.powi(7);
    let g = 0.5 * (1.0 - (c_bar7 / (c_bar7 + POW25_7)).sqrt());

    let a1p = (1.0 + g) * reference.a;
    let a2p = (1.0 + g) * sample.a;
    let c1p = a1p.hypot(reference.b);
    let c2p = a2p.hypot(sample.b);

    let hue = |b: f64, ap: f64| {
        if b == 0.0 && ap == 0.0 {
            0.0
        } else {
            let h = b.atan2(ap).to_degrees();
            if h < 0.0 {
                h + 360.0
            } else {
                h
            }
        }
    };
    let h1p = hue(reference.b, a1p);
    let h2p = hue(sample.b, a2p);

    let dlp = sample.l - reference.l;
    let dcp = c2p - c1p;

    let chroma_product = c1p * c2p;
    let dhp = if chroma_product == 0.0 {
        0.0
    } else {
        let diff = h2p - h1p;
        if diff.abs() <= 180.0 {
            diff
        } else if diff > 180.0 {
            diff - 360.0
        } else {
            diff + 360.0
        }
    };
    let d_hp = 2.0 * chroma_product.sqrt() * (dhp / 2.0).to_radians().sin();

    let l_bar = (reference.l + sample.l) / 2.0;
    let cp_bar = (c1p + c2p) / 2.0;
    let hp_bar = if chroma_product == 0.0 {
        h1p + h2p
    } else if (h1p - h2p).abs() <= 180.0 {
        (h1p + h2p) / 2.0
    } else if h1p + h2p < 360.0 {
        (h1p + h2p + 360.0) / 2.0
    } else {
        (h1p + h2p - 360.0) / 2.0
    };

    let t = 1.0 - 0.17 * (hp_bar - 30.0).to_radians().cos()
        + 0.24 * (2.0 * hp_bar).to_radians().cos()
        + 0.32 * (3.0 * hp_bar + 6.0).to_radians().cos()
        - 0.20 * (4.0 * hp_bar - 63.0).to_radians().cos();

    let d_theta = 30.0 * (-((hp_bar - 275.0) / 25.0).powi(2)).exp();
    let cp_bar7 = cp_bar.powi(7);
    let rc = 2.0 * (cp_bar7 / (cp_bar7 + POW25_7)).sqrt();
    let l50 = (l_bar - 50.0).powi(2);
    let sl = 1.0 + 0.015 * l50 / (20.0 + l50).sqrt();
    let sc = 1.0 + 0.045 * cp_bar;
    let sh = 1.0 + 0.015 * cp_bar * t;
    let rt = -(2.0 * d_theta).to_radians().sin() * rc;

    let tl = dlp / (kl * sl);
    let tc = dcp / (kc * sc);
    let th = d_hp / (kh * sh);

    (tl * tl + tc * tc + th * th + rt * tc * th).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn de00(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
        delta_e(
            Lab::new(a.0, a.1, a.2),
            Lab::new(b.0, b.1, b.2),
            DeltaEFormula::default(),
        )
    }

    #[test]
    fn ciede2000_reference_pairs() {
        // Sharma, Wu & Dalal (2005) test data.
        let cases = [
            ((50.0, 2.6772, -79.7751), (50.0, 0.0, -82.7485), 2.0425),
            ((50.0, 0.0, 0.0), (50.0, -1.0, 2.0), 2.3669),
            ((50.0, 2.5, 0.0), (73.0, 25.0, -18.0), 27.1492),
            ((60.2574, -34.0099, 36.2677), (60.4626, -34.1751, 39.4387), 1.2644),
            ((50.0, 2.5, 0.0), (50.0, 0.0, -2.5), 4.3065),
        ];
        for (a, b, expected) in cases {
            let got = de00(a, b);
            assert!(
                (got - expected).abs() < 1e-4,
                "{a:?} vs {b:?}: got {got}, expected {expected}"
            );
        }
    }

    #[test]
    fn ciede2000_is_symmetric() {
        let a = (50.0, 2.6772, -79.7751);
        let b = (50.0, 0.0, -82.7485);
        assert!((de00(a, b) - de00(b, a)).abs() < 1e-9);
    }

    #[test]
    fn identical_colors_have_zero_difference() {
        let lab = Lab::new(42.0, 12.5, -30.25);
        for formula in [
            DeltaEFormula::Cie76,
            DeltaEFormula::Cie94 {
                application: Cie94Application::Textiles,
            },
            DeltaEFormula::Cmc { l: 2.0, c: 1.0 },
            DeltaEFormula::default(),
        ] {
            assert!(delta_e(lab, lab, formula).abs() < 1e-12, "{formula:?}");
        }
    }

    #[test]
    fn cie76_and_cie94_on_neutral_reference() {
        let reference = Lab::new(50.0, 0.0, 0.0);
        let sample = Lab::new(50.0, 3.0, 4.0);
        assert!((delta_e_76(reference, sample) - 5.0).abs() < 1e-12);
        // Neutral reference: SC = SH = 1 and the whole difference is chroma.
        let de94 = delta_e_94(reference, sample, Cie94Application::GraphicArts);
        assert!((de94 - 5.0).abs() < 1e-9);
    }

    #[test]
    fn cie94_textiles_halves_lightness() {
        let reference = Lab::new(50.0, 0.0, 0.0);
        let sample = Lab::new(54.0, 0.0, 0.0);
        assert!((delta_e_94(reference, sample, Cie94Application::Textiles) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cmc_weights_lightness_by_l() {
        let reference = Lab::new(50.0, 20.0, 10.0);
        let sample = Lab::new(52.0, 20.0, 10.0);
        let acceptability = delta_e_cmc(reference, sample, 2.0, 1.0);
        let perceptibility = delta_e_cmc(reference, sample, 1.0, 1.0);
        assert!((perceptibility / acceptability - 2.0).abs() < 1e-9);
    }

    #[test]
    fn parses_formula_names() {
        assert_eq!("de76".parse::<DeltaEFormula>().unwrap(), DeltaEFormula::Cie76);
        assert_eq!(
            "CMC".parse::<DeltaEFormula>().unwrap(),
            DeltaEFormula::Cmc { l: 2.0, c: 1.0 }
        );
        assert_eq!("de2000".parse::<DeltaEFormula>().unwrap(), DeltaEFormula::default());
        assert!("delta".parse::<DeltaEFormula>().is_err());
    }
}

//! CIELAB and CIE LCh(ab).

use super::spectrum::Reflectance;
use super::tristimulus::{reflectance_to_xyz, white_point, ColorimetricConditions, Xyz};
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 216.0 / 24389.0;
const KAPPA: f64 = 24389.0 / 27.0;

/// CIELAB color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lab {
    /// Lightness (0-100)
    pub l: f64,
    /// Green-red axis
    pub a: f64,
    /// Blue-yellow axis
    pub b: f64,
}

/// Cylindrical CIELAB: lightness, chroma, hue angle in degrees `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lch {
    /// Lightness
    pub l: f64,
    /// Chroma
    pub c: f64,
    /// Hue angle in degrees
    pub h: f64,
}

fn f(t: f64) -> f64 {
    if t > EPSILON {
        t.cbrt()
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

fn f_inv(t: f64) -> f64 {
    let t3 = t * t * t;
    if t3 > EPSILON {
        t3
    } else {
        (116.0 * t - 16.0) / KAPPA
    }
}

impl Lab {
    /// Create from components.
    pub const fn new(l: f64, a: f64, b: f64) -> Self {
        Self { l, a, b }
    }

    /// Convert XYZ relative to `white`.
    pub fn from_xyz(xyz: Xyz, white: Xyz) -> Self {
        let fx = f(xyz.x / white.x);
        let fy = f(xyz.y / white.y);
        let fz = f(xyz.z / white.z);

        Self {
            l: 116.0 * fy - 16.0,
            a: 500.0 * (fx - fy),
            b: 200.0 * (fy - fz),
        }
    }

    /// Back to XYZ relative to `white`.
    pub fn to_xyz(&self, white: Xyz) -> Xyz {
        let fy = (self.l + 16.0) / 116.0;
        let fx = fy + self.a / 500.0;
        let fz = fy - self.b / 200.0;

        let yr = if self.l > KAPPA * EPSILON {
            fy * fy * fy
        } else {
            self.l / KAPPA
        };

        Xyz::new(white.x * f_inv(fx), white.y * yr, white.z * f_inv(fz))
    }

    /// Chroma `sqrt(a² + b²)`.
    pub fn chroma(&self) -> f64 {
        self.a.hypot(self.b)
    }

    /// Cylindrical form.
    pub fn to_lch(&self) -> Lch {
        let h = self.b.atan2(self.a).to_degrees();
        Lch {
            l: self.l,
            c: self.chroma(),
            h: if h < 0.0 { h + 360.0 } else { h },
        }
    }
}

impl Lch {
    /// Rectangular form.
    pub fn to_lab(&self) -> Lab {
        let rad = self.h.to_radians();
        Lab::new(self.l, self.c * rad.cos(), self.c * rad.sin())
    }
}

/// Reflectance straight to CIELAB under the given conditions.
pub fn reflectance_to_lab(reflectance: &Reflectance, conditions: ColorimetricConditions) -> Lab {
    let xyz = reflectance_to_xyz(reflectance, conditions);
    Lab::from_xyz(xyz, white_point(conditions))
}

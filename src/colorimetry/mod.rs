//! Colorimetric computation.
//!
//! Spectral reflectance → CIE XYZ → CIELAB under a standard illuminant and
//! observer, plus color-difference metrics.
//!
//! # Example
//!
//! ```
//! use spectro_daq::colorimetry::{
//!     delta_e, reflectance_to_lab, ColorimetricConditions, DeltaEFormula, Reflectance,
//! };
//!
//! let gray = Reflectance::new(400.0, 10.0, vec![0.18; 31])?;
//! let lighter = Reflectance::new(400.0, 10.0, vec![0.20; 31])?;
//!
//! let conditions = ColorimetricConditions::default(); // D65 / 2°
//! let a = reflectance_to_lab(&gray, conditions);
//! let b = reflectance_to_lab(&lighter, conditions);
//! assert!(delta_e(a, b, DeltaEFormula::default()) > 1.0);
//! # Ok::<(), spectro_daq::SpectroError>(())
//! ```

pub mod difference;
pub mod illuminant;
pub mod lab;
pub mod observer;
pub mod spectrum;
pub mod tristimulus;

pub use difference::{delta_e, Cie94Application, DeltaEFormula};
pub use illuminant::Illuminant;
pub use lab::{reflectance_to_lab, Lab, Lch};
pub use observer::Observer;
pub use spectrum::Reflectance;
pub use tristimulus::{reflectance_to_xyz, white_point, Chromaticity, ColorimetricConditions, Xyz};

//! # spectro-daq
//!
//! Spectrophotometer data acquisition and colorimetry.
//!
//! The crate combines two concerns:
//!
//! - **Colorimetry**: spectral reflectance to CIE XYZ and CIELAB under a
//!   standard illuminant and observer, plus color-difference metrics.
//! - **Instrument control**: one command/response engine shared by drivers
//!   for Datacolor, GretagMacbeth, HunterLab, Konica Minolta and X-Rite
//!   instruments.
//!
//! ## Crate Structure
//!
//! - **`colorimetry`**: reflectance curves, observers, illuminants, XYZ, Lab
//!   and ΔE formulas.
//! - **`protocol`**: the session engine: commands, framing, the bounded job
//!   queue, serial link handling, retries and events.
//! - **`drivers`**: per-vendor protocol knowledge and a simulator.
//! - **`capabilities`**: async capability traits implemented by sessions.
//! - **`measurement`**: measurement records and reflectance CSV files.
//! - **`config`**: Figment configuration loading and validation.
//! - **`logging`**: tracing subscriber setup.
//! - **`error`**: the `SpectroError` type.
//!
//! ## Example
//!
//! ```rust,no_run
//! use spectro_daq::colorimetry::ColorimetricConditions;
//! use spectro_daq::drivers::{CalibrationStep, DriverKind, MeasurementSettings};
//! use spectro_daq::protocol::{SessionOptions, Spectrophotometer};
//!
//! # async fn run() -> spectro_daq::SpectroResult<()> {
//! let driver = DriverKind::XRite.create_shared(None);
//! let session =
//!     Spectrophotometer::connect("bench", driver, "/dev/ttyUSB0", SessionOptions::default())
//!         .await?;
//!
//! session.calibrate(CalibrationStep::White).await?;
//! let measurement = session.measure(&MeasurementSettings::default()).await?;
//! println!("{:?}", measurement.lab(ColorimetricConditions::default()));
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod colorimetry;
pub mod config;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod measurement;
pub mod protocol;

pub use error::{SpectroError, SpectroResult};

//! Instrument capability traits.
//!
//! Small async traits describing what an instrument session can do, so
//! application code can be written against a capability instead of a concrete
//! session type:
//!
//! - [`Identifiable`]: reports who it is
//! - [`Calibratable`]: performs calibration steps
//! - [`SpectralReader`]: takes reflectance measurements
//!
//! [`Spectrophotometer`] implements all three.
//!
//! ```rust,ignore
//! async fn calibrate_and_measure<T>(device: &T) -> SpectroResult<Measurement>
//! where
//!     T: Calibratable + SpectralReader,
//! {
//!     device.calibrate(CalibrationStep::White).await?;
//!     device.read_spectrum(&MeasurementSettings::default()).await
//! }
//! ```

use crate::drivers::{CalibrationStep, Capabilities, MeasurementSettings};
use crate::error::SpectroResult;
use crate::measurement::Measurement;
use crate::protocol::{InstrumentInfo, Spectrophotometer};
use async_trait::async_trait;

/// Capability: identification.
#[async_trait]
pub trait Identifiable: Send + Sync {
    /// Query the instrument's identity.
    async fn identify(&self) -> SpectroResult<InstrumentInfo>;
}

/// Capability: calibration.
///
/// # Contract
/// - The instrument must be presented with the matching reference (white
///   tile, black trap) before the call
/// - Steps the instrument lacks fail with `Unsupported` without touching the link
#[async_trait]
pub trait Calibratable: Send + Sync {
    /// Perform one calibration step.
    async fn calibrate(&self, step: CalibrationStep) -> SpectroResult<()>;
}

/// Capability: spectral reflectance measurement.
#[async_trait]
pub trait SpectralReader: Send + Sync {
    /// Spectral range, apertures and modes.
    fn capabilities(&self) -> Capabilities;

    /// Take one reading.
    async fn read_spectrum(&self, settings: &MeasurementSettings) -> SpectroResult<Measurement>;
}

#[async_trait]
impl Identifiable for Spectrophotometer {
    async fn identify(&self) -> SpectroResult<InstrumentInfo> {
        Spectrophotometer::identify(self).await
    }
}

#[async_trait]
impl Calibratable for Spectrophotometer {
    async fn calibrate(&self, step: CalibrationStep) -> SpectroResult<()> {
        Spectrophotometer::calibrate(self, step).await
    }
}

#[async_trait]
impl SpectralReader for Spectrophotometer {
    fn capabilities(&self) -> Capabilities {
        self.driver().capabilities()
    }

    async fn read_spectrum(&self, settings: &MeasurementSettings) -> SpectroResult<Measurement> {
        self.measure(settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::simulator::XRiteSimulator;
    use crate::drivers::xrite::XRiteDriver;
    use crate::protocol::SessionOptions;
    use std::sync::Arc;

    async fn calibrate_and_read<T>(device: &T) -> SpectroResult<Measurement>
    where
        T: Calibratable + SpectralReader,
    {
        device.calibrate(CalibrationStep::White).await?;
        device.read_spectrum(&MeasurementSettings::default()).await
    }

    #[tokio::test]
    async fn session_through_capability_traits() {
        let (port, _device) = XRiteSimulator::new().requires_calibration(true).spawn();
        let session = Spectrophotometer::open(
            "sim",
            Arc::new(XRiteDriver::default()),
            port,
            SessionOptions::default(),
        );

        let info = Identifiable::identify(&session).await.unwrap();
        assert_eq!(info.model, "SP64");
        assert_eq!(SpectralReader::capabilities(&session).start_nm, 400.0);

        let measurement = calibrate_and_read(&session).await.unwrap();
        assert_eq!(measurement.reflectance.len(), 31);
        session.shutdown().await;
    }
}

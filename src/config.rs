//! Configuration loading with Figment.
//!
//! Configuration is merged from:
//! 1. a TOML file (default `config/spectro.toml`)
//! 2. environment variables prefixed with `SPECTRO_`, nested keys separated
//!    by a double underscore
//!
//! ```text
//! SPECTRO_APPLICATION__LOG_LEVEL=debug
//! SPECTRO_SESSION__QUEUE_CAPACITY=32
//! ```
//!
//! Every section has defaults, so an empty or missing file yields a usable
//! configuration with no instruments.
//!
//! # Example
//! ```no_run
//! use spectro_daq::config::AppConfig;
//!
//! let config = AppConfig::load_from("config/spectro.toml")?;
//! config.validate()?;
//! for instrument in config.enabled_instruments() {
//!     println!("{} on {}", instrument.id, instrument.port);
//! }
//! # Ok::<(), spectro_daq::SpectroError>(())
//! ```

use crate::colorimetry::{ColorimetricConditions, DeltaEFormula, Illuminant, Observer};
use crate::drivers::DriverKind;
use crate::error::{SpectroError, SpectroResult};
use crate::logging::{parse_log_level, OutputFormat};
use crate::protocol::{RetryPolicy, SessionOptions};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/spectro.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SPECTRO_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application settings.
    pub application: ApplicationConfig,
    /// Session engine defaults.
    pub session: SessionConfig,
    /// Colorimetric defaults.
    pub colorimetry: ColorimetryConfig,
    /// Configured instruments.
    pub instruments: Vec<InstrumentConfig>,
}

/// `[application]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name.
    pub name: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log output format.
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "spectro-daq".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Pretty,
        }
    }
}

/// `[session]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Job queue capacity per instrument.
    pub queue_capacity: usize,
    /// Reply timeout replacing every command's own timeout.
    pub timeout_ms: Option<u64>,
    /// Discard stale input before each command.
    pub drain_before_send: bool,
    /// Drain window in milliseconds.
    pub drain_window_ms: u64,
    /// Retry policy for timeouts and framing errors.
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let defaults = SessionOptions::default();
        Self {
            queue_capacity: defaults.queue_capacity,
            timeout_ms: None,
            drain_before_send: defaults.drain_before_send,
            drain_window_ms: defaults.drain_window.as_millis() as u64,
            retry: defaults.retry,
        }
    }
}

impl SessionConfig {
    /// Session options for one instrument, applying its timeout override.
    pub fn options_for(&self, instrument: Option<&InstrumentConfig>) -> SessionOptions {
        let timeout_ms = instrument
            .and_then(|i| i.timeout_ms)
            .or(self.timeout_ms);
        let mut options = SessionOptions::default()
            .with_queue_capacity(self.queue_capacity)
            .with_retry(self.retry)
            .with_drain_before_send(self.drain_before_send)
            .with_drain_window(Duration::from_millis(self.drain_window_ms));
        if let Some(ms) = timeout_ms {
            options = options.with_timeout_override(Duration::from_millis(ms));
        }
        options
    }
}

/// `[colorimetry]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorimetryConfig {
    /// Reference illuminant.
    pub illuminant: Illuminant,
    /// Standard observer.
    pub observer: Observer,
    /// Color-difference formula name (`de76`, `de94`, `cmc`, `de2000`).
    pub delta_e: String,
}

impl Default for ColorimetryConfig {
    fn default() -> Self {
        Self {
            illuminant: Illuminant::D65,
            observer: Observer::Cie1931TwoDegree,
            delta_e: "de2000".to_string(),
        }
    }
}

impl ColorimetryConfig {
    /// Illuminant and observer pair.
    pub fn conditions(&self) -> ColorimetricConditions {
        ColorimetricConditions::new(self.illuminant, self.observer)
    }

    /// Parsed color-difference formula.
    pub fn formula(&self) -> SpectroResult<DeltaEFormula> {
        self.delta_e.parse()
    }
}

/// One `[[instruments]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Unique id.
    pub id: String,
    /// Driver name (see [`DriverKind`]).
    pub driver: String,
    /// Model, when it differs from the driver's default.
    #[serde(default)]
    pub model: Option<String>,
    /// Serial port path.
    pub port: String,
    /// Whether the instrument is used.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Reply timeout for this instrument.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl InstrumentConfig {
    /// Parsed driver name.
    pub fn driver_kind(&self) -> SpectroResult<DriverKind> {
        self.driver.parse()
    }
}

impl AppConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> SpectroResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> SpectroResult<Self> {
        let config = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Check semantic constraints the types cannot express.
    pub fn validate(&self) -> SpectroResult<()> {
        parse_log_level(&self.application.log_level)?;

        if self.session.queue_capacity == 0 {
            return Err(SpectroError::Configuration(
                "session.queue_capacity must be at least 1".into(),
            ));
        }
        if self.session.timeout_ms == Some(0) {
            return Err(SpectroError::Configuration(
                "session.timeout_ms must be positive".into(),
            ));
        }
        self.colorimetry.formula()?;

        let mut ids = HashSet::new();
        for instrument in &self.instruments {
            if instrument.id.trim().is_empty() {
                return Err(SpectroError::Configuration("instrument id is empty".into()));
            }
            if !ids.insert(instrument.id.as_str()) {
                return Err(SpectroError::Configuration(format!(
                    "Duplicate instrument ID: {}",
                    instrument.id
                )));
            }
            instrument.driver_kind()?;
            if instrument.timeout_ms == Some(0) {
                return Err(SpectroError::Configuration(format!(
                    "instrument '{}': timeout_ms must be positive",
                    instrument.id
                )));
            }
        }

        Ok(())
    }

    /// Enabled instruments in file order.
    pub fn enabled_instruments(&self) -> Vec<&InstrumentConfig> {
        self.instruments.iter().filter(|i| i.enabled).collect()
    }

    /// Look up an instrument by id.
    pub fn instrument(&self, id: &str) -> Option<&InstrumentConfig> {
        self.instruments.iter().find(|i| i.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument(id: &str, driver: &str) -> InstrumentConfig {
        InstrumentConfig {
            id: id.to_string(),
            driver: driver.to_string(),
            model: None,
            port: "/dev/ttyUSB0".to_string(),
            enabled: true,
            timeout_ms: None,
        }
    }

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.queue_capacity, 16);
        assert_eq!(config.colorimetry.conditions(), ColorimetricConditions::default());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_instrument_ids() {
        let config = AppConfig {
            instruments: vec![instrument("a", "xrite"), instrument("a", "minolta")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate instrument ID"));
    }

    #[test]
    fn test_unknown_driver() {
        let config = AppConfig {
            instruments: vec![instrument("a", "spectrolux")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_queue_capacity() {
        let mut config = AppConfig::default();
        config.session.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enabled_and_lookup() {
        let mut off = instrument("b", "gretag");
        off.enabled = false;
        let config = AppConfig {
            instruments: vec![instrument("a", "xrite"), off],
            ..Default::default()
        };
        let enabled: Vec<_> = config.enabled_instruments().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(enabled, vec!["a"]);
        assert_eq!(config.instrument("b").map(|i| i.driver.as_str()), Some("gretag"));
        assert!(config.instrument("c").is_none());
    }

    #[test]
    fn test_instrument_timeout_wins() {
        let mut session = SessionConfig::default();
        session.timeout_ms = Some(500);
        let mut inst = instrument("a", "xrite");
        assert_eq!(
            session.options_for(Some(&inst)).timeout_override,
            Some(Duration::from_millis(500))
        );
        inst.timeout_ms = Some(50);
        assert_eq!(
            session.options_for(Some(&inst)).timeout_override,
            Some(Duration::from_millis(50))
        );
        assert_eq!(
            SessionConfig::default().options_for(None).timeout_override,
            None
        );
    }
}

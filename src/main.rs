//! CLI entry point for spectro-daq.
//!
//! # Usage
//!
//! List drivers:
//! ```bash
//! spectro-daq drivers
//! ```
//!
//! Measure with a configured instrument, or against the built-in simulator:
//! ```bash
//! spectro-daq measure --instrument bench --calibrate --output sample.csv
//! spectro-daq measure --instrument bench --simulate --json
//! ```
//!
//! Colorimetry on a saved curve:
//! ```bash
//! spectro-daq convert sample.csv --illuminant D50 --observer 10
//! spectro-daq delta-e --reference 50,10,-5 --sample 51,9,-4 --formula cmc
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use spectro_daq::colorimetry::{
    delta_e, reflectance_to_lab, reflectance_to_xyz, ColorimetricConditions, DeltaEFormula,
    Illuminant, Lab, Observer, Reflectance,
};
use spectro_daq::config::{AppConfig, InstrumentConfig, DEFAULT_CONFIG_PATH};
use spectro_daq::drivers::simulator::XRiteSimulator;
use spectro_daq::drivers::xrite::XRiteDriver;
use spectro_daq::drivers::{Aperture, CalibrationStep, DriverKind, MeasurementSettings, SpecularMode};
use spectro_daq::logging;
use spectro_daq::measurement::{load_reflectance_csv, save_reflectance_csv, Measurement};
use spectro_daq::protocol::Spectrophotometer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "spectro-daq")]
#[command(about = "Spectrophotometer acquisition and colorimetry", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported drivers and their capabilities
    Drivers,

    /// Query an instrument's identity
    Identify {
        /// Instrument id from the configuration
        #[arg(long)]
        instrument: Option<String>,

        /// Talk to the built-in X-Rite simulator instead of hardware
        #[arg(long)]
        simulate: bool,
    },

    /// Take one reflectance measurement
    Measure {
        /// Instrument id from the configuration
        #[arg(long)]
        instrument: Option<String>,

        /// Talk to the built-in X-Rite simulator instead of hardware
        #[arg(long)]
        simulate: bool,

        /// Run a white calibration first
        #[arg(long)]
        calibrate: bool,

        /// Specular mode (SCI or SCE)
        #[arg(long)]
        specular: Option<SpecularMode>,

        /// Aperture (LAV, MAV or SAV)
        #[arg(long)]
        aperture: Option<Aperture>,

        /// Readings averaged per measurement
        #[arg(long, default_value_t = 1)]
        averaging: u8,

        /// Write the reflectance curve to this CSV file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the measurement as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute XYZ, Lab and LCh from a reflectance CSV file
    Convert {
        /// CSV with `wavelength_nm,reflectance` rows
        file: PathBuf,

        /// Illuminant (defaults to the configured one)
        #[arg(long)]
        illuminant: Option<Illuminant>,

        /// Observer, 2 or 10 (defaults to the configured one)
        #[arg(long)]
        observer: Option<Observer>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Color difference between two Lab values
    DeltaE {
        /// Reference color as L,a,b
        #[arg(long, value_parser = parse_lab, allow_hyphen_values = true)]
        reference: Lab,

        /// Sample color as L,a,b
        #[arg(long, value_parser = parse_lab, allow_hyphen_values = true)]
        sample: Lab,

        /// Formula (de76, de94, cmc, de2000); defaults to the configured one
        #[arg(long)]
        formula: Option<DeltaEFormula>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    config.validate().context("invalid configuration")?;
    logging::init_from_config(&config).context("initializing logging")?;

    match cli.command {
        Commands::Drivers => list_drivers(),
        Commands::Identify {
            instrument,
            simulate,
        } => identify(&config, instrument.as_deref(), simulate).await,
        Commands::Measure {
            instrument,
            simulate,
            calibrate,
            specular,
            aperture,
            averaging,
            output,
            json,
        } => {
            let mut settings = MeasurementSettings::default().with_averaging(averaging);
            if let Some(specular) = specular {
                settings = settings.with_specular(specular);
            }
            if let Some(aperture) = aperture {
                settings = settings.with_aperture(aperture);
            }
            let request = MeasureRequest {
                instrument,
                simulate,
                calibrate,
                settings,
                output,
                json,
            };
            measure(&config, request).await
        }
        Commands::Convert {
            file,
            illuminant,
            observer,
            json,
        } => {
            let defaults = config.colorimetry.conditions();
            let conditions = ColorimetricConditions::new(
                illuminant.unwrap_or(defaults.illuminant),
                observer.unwrap_or(defaults.observer),
            );
            convert(&file, conditions, json)
        }
        Commands::DeltaE {
            reference,
            sample,
            formula,
        } => {
            let formula = match formula {
                Some(formula) => formula,
                None => config.colorimetry.formula()?,
            };
            println!("{:.4}", delta_e(reference, sample, formula));
            Ok(())
        }
    }
}

fn list_drivers() -> Result<()> {
    for kind in DriverKind::all() {
        let driver = kind.create(None);
        let caps = driver.capabilities();
        let join = |items: Vec<String>| {
            if items.is_empty() {
                "-".to_string()
            } else {
                items.join("/")
            }
        };
        println!(
            "{:<10} {:<14} {:<20} {}-{} nm @ {} nm ({} samples)  specular {}  aperture {}  black cal {}",
            kind.name(),
            driver.vendor(),
            driver.model(),
            caps.start_nm,
            caps.end_nm,
            caps.interval_nm,
            caps.sample_count(),
            join(caps.specular_modes.iter().map(ToString::to_string).collect()),
            join(caps.apertures.iter().map(ToString::to_string).collect()),
            if caps.black_calibration { "yes" } else { "no" },
        );
    }
    Ok(())
}

async fn identify(config: &AppConfig, instrument: Option<&str>, simulate: bool) -> Result<()> {
    let session = open_session(config, instrument, simulate).await?;
    let result = session.identify().await;
    session.shutdown().await;

    let info = result.context("identify failed")?;
    println!("{info}");
    Ok(())
}

struct MeasureRequest {
    instrument: Option<String>,
    simulate: bool,
    calibrate: bool,
    settings: MeasurementSettings,
    output: Option<PathBuf>,
    json: bool,
}

async fn measure(config: &AppConfig, request: MeasureRequest) -> Result<()> {
    let session = open_session(config, request.instrument.as_deref(), request.simulate).await?;
    let result = take_measurement(&session, request.calibrate, &request.settings).await;
    session.shutdown().await;
    let measurement = result?;

    if let Some(path) = &request.output {
        save_reflectance_csv(path, &measurement.reflectance)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "Reflectance saved");
    }

    let conditions = config.colorimetry.conditions();
    if request.json {
        let report = serde_json::json!({
            "measurement": measurement,
            "conditions": conditions,
            "xyz": measurement.xyz(conditions),
            "lab": measurement.lab(conditions),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} {} {} ({} samples)",
            measurement.instrument,
            measurement.model,
            measurement.taken_at.to_rfc3339(),
            measurement.reflectance.len()
        );
        print_color(&measurement.reflectance, conditions);
    }
    Ok(())
}

async fn take_measurement(
    session: &Spectrophotometer,
    calibrate: bool,
    settings: &MeasurementSettings,
) -> Result<Measurement> {
    if calibrate {
        session
            .calibrate(CalibrationStep::White)
            .await
            .context("white calibration failed")?;
    }
    session.measure(settings).await.context("measurement failed")
}

fn convert(file: &Path, conditions: ColorimetricConditions, json: bool) -> Result<()> {
    let reflectance =
        load_reflectance_csv(file).with_context(|| format!("reading {}", file.display()))?;

    if json {
        let lab = reflectance_to_lab(&reflectance, conditions);
        let report = serde_json::json!({
            "conditions": conditions,
            "xyz": reflectance_to_xyz(&reflectance, conditions),
            "lab": lab,
            "lch": lab.to_lch(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_color(&reflectance, conditions);
    }
    Ok(())
}

fn print_color(reflectance: &Reflectance, conditions: ColorimetricConditions) {
    let xyz = reflectance_to_xyz(reflectance, conditions);
    let lab = reflectance_to_lab(reflectance, conditions);
    let lch = lab.to_lch();
    println!("{conditions}");
    println!("XYZ  {:>9.4} {:>9.4} {:>9.4}", xyz.x, xyz.y, xyz.z);
    println!("Lab  {:>9.4} {:>9.4} {:>9.4}", lab.l, lab.a, lab.b);
    println!("LCh  {:>9.4} {:>9.4} {:>9.4}", lch.l, lch.c, lch.h);
}

async fn open_session(
    config: &AppConfig,
    instrument: Option<&str>,
    simulate: bool,
) -> Result<Spectrophotometer> {
    let entry = select_instrument(config, instrument, simulate)?;
    let options = config.session.options_for(entry);

    if simulate {
        let id = entry.map(|e| e.id.as_str()).unwrap_or("simulator");
        if let Some(entry) = entry {
            if entry.driver_kind()? != DriverKind::XRite {
                warn!(instrument = %entry.id, driver = %entry.driver, "Simulator speaks X-Rite only");
            }
        }
        let (port, _device) = XRiteSimulator::new().spawn();
        return Ok(Spectrophotometer::open(
            id,
            Arc::new(XRiteDriver::default()),
            port,
            options,
        ));
    }

    let entry = entry.ok_or_else(|| anyhow!("no instrument configured"))?;
    let driver = entry.driver_kind()?.create_shared(entry.model.as_deref());
    Spectrophotometer::connect(&entry.id, driver, &entry.port, options)
        .await
        .with_context(|| format!("opening {} on {}", entry.id, entry.port))
}

fn select_instrument<'a>(
    config: &'a AppConfig,
    id: Option<&str>,
    simulate: bool,
) -> Result<Option<&'a InstrumentConfig>> {
    match id {
        Some(id) => config
            .instrument(id)
            .map(Some)
            .ok_or_else(|| anyhow!("instrument '{id}' not found in configuration")),
        None => match config.enabled_instruments().as_slice() {
            [] if simulate => Ok(None),
            [] => Err(anyhow!("no enabled instruments; pass --simulate or configure one")),
            [only] => Ok(Some(*only)),
            many => Err(anyhow!(
                "{} instruments enabled; choose one with --instrument",
                many.len()
            )),
        },
    }
}

fn parse_lab(s: &str) -> Result<Lab, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid number in '{s}': {e}"))?;
    match parts.as_slice() {
        [l, a, b] => Ok(Lab::new(*l, *a, *b)),
        _ => Err(format!("expected L,a,b but got '{s}'")),
    }
}

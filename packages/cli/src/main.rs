#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for heating emissions computations.
//!
//! ```text
//! heating_emissions compute --aoi area.geojson --name Heidelberg [--year 2022] [--temporal]
//! heating_emissions init-db [--path data/census.duckdb] [--import extracts/]
//! heating_emissions check-aoi --aoi area.geojson --name Heidelberg
//! ```
//!
//! Uses `indicatif-log-bridge` (via [`heating_emissions_cli_utils::init_logger`])
//! so that log lines and the downscaling progress bar do not interleave.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use heating_emissions_cli_utils::IndicatifProgress;
use heating_emissions_database::{census_db, paths};
use heating_emissions_operator::{
    ComputeInput, DEFAULT_YEAR, Operator, OperatorError, Settings, TemporalOutcome, check_aoi,
    export, null_progress,
};
use heating_emissions_spatial::Aoi;

#[derive(Parser)]
#[command(
    name = "heating_emissions",
    about = "Residential heating CO2 emissions from German census grid data"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute gridded emissions for an area of interest
    Compute {
        /// `GeoJSON` file with the AOI polygon(s)
        #[arg(long)]
        aoi: PathBuf,
        /// AOI display name
        #[arg(long)]
        name: String,
        /// Year simulated by the temporal downscaling
        #[arg(long, default_value_t = DEFAULT_YEAR)]
        year: i32,
        /// Also compute yearly and daily emissions from weather data
        #[arg(long)]
        temporal: bool,
        /// Settings file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output directory (defaults to data/output/<name>)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Create the census database schema
    InitDb {
        /// Database file (defaults to data/census.duckdb)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Directory of census CSV extracts to load
        #[arg(long)]
        import: Option<PathBuf>,
    },
    /// Only run the AOI checks
    CheckAoi {
        /// `GeoJSON` file with the AOI polygon(s)
        #[arg(long)]
        aoi: PathBuf,
        /// AOI display name
        #[arg(long)]
        name: String,
    },
}

fn read_aoi(path: &Path, name: &str) -> Result<Aoi, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(Aoi::from_geojson_str(name, &text)?)
}

/// Prints user errors plainly and exits; other errors propagate.
fn report(result: Result<(), OperatorError>) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        Err(e) if e.is_user_error() => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        other => other.map_err(Into::into),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = heating_emissions_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Compute {
            aoi,
            name,
            year,
            temporal,
            config,
            output,
        } => {
            let aoi = read_aoi(&aoi, &name)?;
            let settings = Settings::load(config.as_deref())?;
            let operator = Operator::from_settings(settings)?;
            let input = ComputeInput { temporal, year };
            let progress = if temporal {
                IndicatifProgress::months_bar(&multi, "Temporal downscaling")
            } else {
                null_progress()
            };

            let result = operator.compute(&aoi, &input, progress.as_ref()).await;
            let computed = match result {
                Ok(computed) => computed,
                Err(e) => return report(Err(e)),
            };

            if let TemporalOutcome::Failed(message) = &computed.temporal {
                eprintln!("{message}");
            }

            let dir = output.unwrap_or_else(|| paths::output_dir().join(name.to_lowercase()));
            let written = export(&computed, &dir)?;
            for path in &written {
                println!("{}", path.display());
            }
            println!(
                "\n{} cells, {:.2} t CO2/year",
                computed.summary.cells,
                computed.summary.total_co2_emissions / 1e3
            );
        }
        Commands::InitDb { path, import } => {
            let path = path.unwrap_or_else(paths::census_db_path);
            let conn = census_db::open(&path)?;
            log::info!("Census schema ready in {}", path.display());

            if let Some(dir) = import {
                let rows = census_db::import_csv_dir(&conn, &dir)?;
                println!("Loaded {rows} rows from {}", dir.display());
            }
        }
        Commands::CheckAoi { aoi, name } => {
            let aoi = read_aoi(&aoi, &name)?;
            report(check_aoi(&aoi))?;
            println!("{name} can be computed.");
        }
    }

    Ok(())
}

//! Writes a [`ComputeOutput`] to a directory.
//!
//! | File | Content |
//! |---|---|
//! | `emissions.csv` | per-cell yearly emissions, rounded |
//! | `characteristics.csv` | dominant building age and energy source per cell |
//! | `cells.geojson` | cell centroids with emissions and dominant labels |
//! | `yearly_emissions.csv` | downscaled per-cell emissions (temporal only) |
//! | `daily_emissions.csv` | regional daily emissions (temporal only) |
//! | `summary.json` | distribution summaries and temporal outcome |

use std::io::Write as _;
use std::path::{Path, PathBuf};

use heating_emissions_calculator::AoiSummary;
use heating_emissions_database::paths;
use serde::Serialize;

use crate::{ComputeOutput, OperatorError, TemporalOutcome};

#[derive(Serialize)]
struct YearlyRow<'a> {
    id: &'a str,
    co2_emissions: f64,
}

#[derive(Serialize)]
struct Summary<'a> {
    aoi_name: &'a str,
    year: i32,
    #[serde(flatten)]
    summary: &'a AoiSummary,
    captions: Vec<String>,
    temporal_status: &'static str,
    temporal_error: Option<&'a str>,
    simulated_total_tonnes: Option<f64>,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> OperatorError {
    move |source| OperatorError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn write_csv<S: Serialize>(
    path: &Path,
    rows: impl IntoIterator<Item = S>,
) -> Result<(), OperatorError> {
    let mut writer = csv::WriterBuilder::new().from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(io_error(path))?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), OperatorError> {
    let file = std::fs::File::create(path).map_err(io_error(path))?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(io_error(path))?;
    Ok(())
}

fn cells_geojson(output: &ComputeOutput) -> serde_json::Value {
    let features: Vec<serde_json::Value> = output
        .emissions
        .iter()
        .map(|(id, record)| {
            let record = record.rounded();
            let dominant = output.census.uncalculated.get(id);
            serde_json::json!({
                "type": "Feature",
                "id": id,
                "geometry": {
                    "type": "Point",
                    "coordinates": [record.longitude, record.latitude],
                },
                "properties": {
                    "population": record.population,
                    "heated_area": record.heated_area,
                    "co2_emissions": record.co2_emissions,
                    "co2_emissions_per_capita": record.co2_emissions_per_capita,
                    "heat_consumption": record.heat_consumption,
                    "emission_factor": record.emission_factor,
                    "dominant_age": dominant.map(|d| d.dominant_age.as_str()),
                    "dominant_energy": dominant.map(|d| d.dominant_energy.as_str()),
                },
            })
        })
        .collect();

    serde_json::json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// Exports `output` into `dir` (created if missing) and returns the paths
/// written.
///
/// # Errors
///
/// Returns [`OperatorError`] if a file cannot be written.
pub fn export(output: &ComputeOutput, dir: &Path) -> Result<Vec<PathBuf>, OperatorError> {
    paths::ensure_dir(dir).map_err(io_error(dir))?;
    let mut written = Vec::new();

    let path = dir.join("emissions.csv");
    write_csv(&path, output.emissions.values().map(|r| r.rounded()))?;
    written.push(path);

    let path = dir.join("characteristics.csv");
    write_csv(&path, output.census.uncalculated.values())?;
    written.push(path);

    let path = dir.join("cells.geojson");
    write_json(&path, &cells_geojson(output))?;
    written.push(path);

    let (temporal_status, temporal_error, simulated_total_tonnes) = match &output.temporal {
        TemporalOutcome::NotRequested => ("not_requested", None, None),
        TemporalOutcome::Failed(message) => ("failed", Some(message.as_str()), None),
        TemporalOutcome::Completed(result) => {
            let path = dir.join("yearly_emissions.csv");
            write_csv(
                &path,
                result.yearly.iter().map(|(id, value)| YearlyRow {
                    id,
                    co2_emissions: value.round(),
                }),
            )?;
            written.push(path);

            let path = dir.join("daily_emissions.csv");
            write_csv(&path, &result.daily)?;
            written.push(path);

            let total: f64 = result.daily.iter().map(|d| d.co2_emissions).sum();
            ("completed", None, Some((total / 1e3 * 100.0).round() / 100.0))
        }
    };

    let captions = [
        output.summary.per_capita_caption(),
        output.summary.heat_consumption_caption(),
        output.summary.emission_factor_caption(),
    ]
    .into_iter()
    .flatten()
    .collect();

    let path = dir.join("summary.json");
    write_json(
        &path,
        &Summary {
            aoi_name: &output.aoi_name,
            year: output.year,
            summary: &output.summary,
            captions,
            temporal_status,
            temporal_error,
            simulated_total_tonnes,
        },
    )?;
    written.push(path);

    log::info!("Exported {} files to {}", written.len(), dir.display());

    Ok(written)
}

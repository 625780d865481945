//! Reading downloaded monthly archives.
//!
//! An archive is a zip whose members each hold a subset of the variables,
//! either as `NetCDF` files (what the climate data store delivers, read with
//! the `netcdf` feature) or as CSV tables with `valid_time`, `latitude`,
//! `longitude` and one column per variable short name. Members are merged
//! on `(valid_time, latitude, longitude)`; two members carrying different
//! values for the same variable at the same key is an error.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use heating_emissions_weather_models::{RawSample, ReanalysisVariable, WeatherDataset, WeatherPoint};
use strum::IntoEnumIterator as _;

use crate::WeatherError;
use crate::preprocess::preprocess;

pub(crate) type RecordKey = (NaiveDateTime, WeatherPoint);
pub(crate) type Record = BTreeMap<ReanalysisVariable, f64>;

const TIME_COLUMN: &str = "valid_time";
const LATITUDE_COLUMN: &str = "latitude";
const LONGITUDE_COLUMN: &str = "longitude";

/// Opens an archive and returns its preprocessed dataset.
///
/// # Errors
///
/// * [`WeatherError::Io`] / [`WeatherError::Zip`] if the file cannot be read
/// * [`WeatherError::UnsupportedMember`] for `NetCDF` members when built
///   without the `netcdf` feature
/// * [`WeatherError::Conflict`] if two members disagree on a value
/// * [`WeatherError::Csv`] / [`WeatherError::Parse`] for malformed tables
/// * `WeatherError::NetCdf` for unreadable `NetCDF` members
pub fn open_archive(path: &Path) -> Result<WeatherDataset, WeatherError> {
    log::debug!("Reading weather archive {}", path.display());

    let file = File::open(path).map_err(|e| WeatherError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut records: BTreeMap<RecordKey, Record> = BTreeMap::new();

    for i in 0..archive.len() {
        let mut member = archive.by_index(i)?;
        let name = member.name().to_string();

        if member.is_dir() {
            continue;
        }
        let lower = name.to_lowercase();
        if lower.ends_with(".nc") {
            merge_netcdf_member(&mut records, path, &name, &mut member)?;
            continue;
        }
        if !lower.ends_with(".csv") {
            log::warn!("Skipping archive member {name}");
            continue;
        }

        let mut contents = String::new();
        member
            .read_to_string(&mut contents)
            .map_err(|e| WeatherError::io(Path::new(&name), e))?;
        merge_member(&mut records, &name, &contents)?;
    }

    let raw = complete_samples(records);
    log::debug!("{} hourly records in {}", raw.len(), path.display());

    Ok(preprocess(&raw))
}

#[cfg(feature = "netcdf")]
fn merge_netcdf_member(
    records: &mut BTreeMap<RecordKey, Record>,
    archive: &Path,
    name: &str,
    member: &mut impl Read,
) -> Result<(), WeatherError> {
    let mut bytes = Vec::new();
    member
        .read_to_end(&mut bytes)
        .map_err(|e| WeatherError::io(Path::new(name), e))?;
    crate::nc::merge_member(records, archive, name, &bytes)
}

#[cfg(not(feature = "netcdf"))]
fn merge_netcdf_member(
    _records: &mut BTreeMap<RecordKey, Record>,
    _archive: &Path,
    name: &str,
    _member: &mut impl Read,
) -> Result<(), WeatherError> {
    Err(WeatherError::UnsupportedMember {
        member: name.to_string(),
    })
}

/// Stores `value` unless the record already holds a different one.
pub(crate) fn insert_value(
    records: &mut BTreeMap<RecordKey, Record>,
    time: NaiveDateTime,
    point: WeatherPoint,
    variable: ReanalysisVariable,
    value: f64,
) -> Result<(), WeatherError> {
    let record = records.entry((time, point)).or_default();
    match record.get(&variable) {
        Some(existing) if (existing - value).abs() > f64::EPSILON => Err(WeatherError::Conflict {
            variable: variable.short_name().to_string(),
            time: time.to_string(),
            latitude: point.latitude(),
            longitude: point.longitude(),
        }),
        Some(_) => Ok(()),
        None => {
            record.insert(variable, value);
            Ok(())
        }
    }
}

/// Parses one CSV member and merges its values into `records`.
fn merge_member(
    records: &mut BTreeMap<RecordKey, Record>,
    name: &str,
    contents: &str,
) -> Result<(), WeatherError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |wanted: &str| {
        headers
            .iter()
            .position(|h| h == wanted)
            .ok_or_else(|| WeatherError::Parse {
                message: format!("{name} has no {wanted} column"),
            })
    };
    let time_idx = column(TIME_COLUMN)?;
    let lat_idx = column(LATITUDE_COLUMN)?;
    let lon_idx = column(LONGITUDE_COLUMN)?;

    let variables: Vec<(usize, ReanalysisVariable)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| ReanalysisVariable::from_short_name(h).map(|v| (i, v)))
        .collect();

    for row in reader.records() {
        let row = row?;
        let field = |i: usize| row.get(i).unwrap_or_default();

        let time = parse_time(field(time_idx))?;
        let latitude = parse_number(field(lat_idx), name)?;
        let longitude = parse_number(field(lon_idx), name)?;
        let point = WeatherPoint::new(latitude, longitude);

        for &(i, variable) in &variables {
            let value = field(i);
            if value.is_empty() {
                continue;
            }
            let value = parse_number(value, name)?;
            if value.is_nan() {
                continue;
            }
            insert_value(records, time, point, variable, value)?;
        }
    }

    Ok(())
}

/// Keeps the records that carry every variable.
fn complete_samples(records: BTreeMap<RecordKey, Record>) -> Vec<RawSample> {
    let mut incomplete = 0usize;
    let samples: Vec<RawSample> = records
        .into_iter()
        .filter_map(|((time, point), record)| {
            let sample = to_raw_sample(time, point, &record);
            if sample.is_none() {
                incomplete += 1;
            }
            sample
        })
        .collect();

    if incomplete > 0 {
        log::warn!("Dropped {incomplete} records with missing variables");
    }
    samples
}

fn to_raw_sample(time: NaiveDateTime, point: WeatherPoint, record: &Record) -> Option<RawSample> {
    if ReanalysisVariable::iter().any(|v| !record.contains_key(&v)) {
        return None;
    }
    Some(RawSample {
        time,
        point,
        t2m: record[&ReanalysisVariable::Temperature2m],
        d2m: record[&ReanalysisVariable::DewPoint2m],
        sp: record[&ReanalysisVariable::SurfacePressure],
        u10: record[&ReanalysisVariable::WindU10m],
        v10: record[&ReanalysisVariable::WindV10m],
        ssrd: record[&ReanalysisVariable::SolarRadiation],
    })
}

/// Parses `YYYY-MM-DD HH:MM:SS`, also accepting a `T` separator.
fn parse_time(value: &str) -> Result<NaiveDateTime, WeatherError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|e| WeatherError::Parse {
            message: format!("invalid time {value:?}: {e}"),
        })
}

fn parse_number(value: &str, member: &str) -> Result<f64, WeatherError> {
    value.parse().map_err(|e| WeatherError::Parse {
        message: format!("invalid number {value:?} in {member}: {e}"),
    })
}

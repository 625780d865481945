//! `NetCDF` archive members.
//!
//! The climate data store ships one file per step type (`instant` and
//! `accum`), each variable laid out over `(valid_time, latitude, longitude)`.
//! Older deliveries name the time axis `time` and count hours since 1900.
//! Packed variables are unpacked with `scale_factor` and `add_offset`, and
//! fill values are skipped.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use heating_emissions_weather_models::{ReanalysisVariable, WeatherPoint};
use strum::IntoEnumIterator as _;

use crate::WeatherError;
use crate::archive::{Record, RecordKey, insert_value};

const TIME_AXES: [&str; 2] = ["valid_time", "time"];
const LATITUDE: &str = "latitude";
const LONGITUDE: &str = "longitude";

/// Merges the variables of one `NetCDF` member into `records`.
///
/// The library only opens files, so the member is written next to
/// `archive` for the duration of the read.
pub(crate) fn merge_member(
    records: &mut BTreeMap<RecordKey, Record>,
    archive: &Path,
    name: &str,
    bytes: &[u8],
) -> Result<(), WeatherError> {
    let scratch = scratch_path(archive, name);
    std::fs::write(&scratch, bytes).map_err(|e| WeatherError::io(&scratch, e))?;

    let merged = netcdf::open(&scratch)
        .map_err(WeatherError::from)
        .and_then(|file| merge_file(records, &file, name));

    if let Err(e) = std::fs::remove_file(&scratch) {
        log::warn!("Could not remove {}: {e}", scratch.display());
    }
    merged
}

fn scratch_path(archive: &Path, member: &str) -> PathBuf {
    let member = Path::new(member)
        .file_name()
        .unwrap_or_else(|| OsStr::new(member))
        .to_string_lossy();
    let stem = archive
        .file_stem()
        .map(OsStr::to_string_lossy)
        .unwrap_or_default();
    archive.with_file_name(format!(".{stem}.{member}"))
}

fn merge_file(
    records: &mut BTreeMap<RecordKey, Record>,
    file: &netcdf::File,
    name: &str,
) -> Result<(), WeatherError> {
    let (time_axis, times) = read_times(file, name)?;
    let latitudes = read_axis(file, LATITUDE, name)?;
    let longitudes = read_axis(file, LONGITUDE, name)?;
    let lengths = [times.len(), latitudes.len(), longitudes.len()];

    let mut found = 0usize;
    for variable in ReanalysisVariable::iter() {
        let Some(var) = file.variable(variable.short_name()) else {
            continue;
        };
        found += 1;

        let [time_stride, lat_stride, lon_stride] = strides(&var, time_axis, lengths, name)?;
        let values = unpacked_values(&var)?;

        for (t, &time) in times.iter().enumerate() {
            for (i, &latitude) in latitudes.iter().enumerate() {
                for (j, &longitude) in longitudes.iter().enumerate() {
                    let index = t * time_stride + i * lat_stride + j * lon_stride;
                    let Some(value) = values.get(index).copied().flatten() else {
                        continue;
                    };
                    let point = WeatherPoint::new(latitude, longitude);
                    insert_value(records, time, point, variable, value)?;
                }
            }
        }
    }

    if found == 0 {
        log::warn!("{name} holds none of the reanalysis variables");
    } else {
        log::debug!("{name}: {found} variables over {} times", times.len());
    }
    Ok(())
}

/// Strides of the time, latitude and longitude axes in the flattened
/// values of `var`. Any other dimension must have length one.
fn strides(
    var: &netcdf::Variable,
    time_axis: &str,
    lengths: [usize; 3],
    name: &str,
) -> Result<[usize; 3], WeatherError> {
    let layout_error = |detail: String| WeatherError::Parse {
        message: format!("{name}: {} {detail}", var.name()),
    };

    let mut strides = [None; 3];
    let mut stride = 1usize;
    for dim in var.dimensions().iter().rev() {
        let dim_name = dim.name();
        let axis = [time_axis, LATITUDE, LONGITUDE]
            .iter()
            .position(|axis| *axis == dim_name);

        match axis {
            Some(axis) => {
                if dim.len() != lengths[axis] {
                    return Err(layout_error(format!(
                        "has {} values along {dim_name}, expected {}",
                        dim.len(),
                        lengths[axis]
                    )));
                }
                strides[axis] = Some(stride);
            }
            None if dim.len() == 1 => {}
            None => {
                return Err(layout_error(format!(
                    "has unexpected dimension {dim_name} of length {}",
                    dim.len()
                )));
            }
        }
        stride *= dim.len();
    }

    match strides {
        [Some(time), Some(lat), Some(lon)] => Ok([time, lat, lon]),
        _ => Err(layout_error(format!(
            "is not laid out over ({time_axis}, {LATITUDE}, {LONGITUDE})"
        ))),
    }
}

/// Values of `var` with packing undone; `None` marks fill values.
fn unpacked_values(var: &netcdf::Variable) -> Result<Vec<Option<f64>>, WeatherError> {
    let scale = numeric_attribute(var, "scale_factor")?.unwrap_or(1.0);
    let offset = numeric_attribute(var, "add_offset")?.unwrap_or(0.0);
    let fills: Vec<f64> = [
        numeric_attribute(var, "_FillValue")?,
        numeric_attribute(var, "missing_value")?,
    ]
    .into_iter()
    .flatten()
    .collect();

    let raw = var.get_values::<f64, _>(..)?;
    Ok(raw
        .into_iter()
        .map(|value| {
            let missing = value.is_nan()
                || fills
                    .iter()
                    .any(|fill| (value - fill).abs() <= fill.abs().max(1.0) * 1e-9);
            (!missing).then(|| value.mul_add(scale, offset))
        })
        .collect())
}

fn numeric_attribute(var: &netcdf::Variable, key: &str) -> Result<Option<f64>, WeatherError> {
    Ok(var
        .attribute_value(key)
        .transpose()?
        .map(f64::try_from)
        .transpose()?)
}

fn read_axis(file: &netcdf::File, axis: &str, name: &str) -> Result<Vec<f64>, WeatherError> {
    let var = file.variable(axis).ok_or_else(|| WeatherError::Parse {
        message: format!("{name} has no {axis} variable"),
    })?;
    Ok(var.get_values::<f64, _>(..)?)
}

fn read_times(
    file: &netcdf::File,
    name: &str,
) -> Result<(&'static str, Vec<NaiveDateTime>), WeatherError> {
    let (axis, var) = TIME_AXES
        .iter()
        .find_map(|axis| file.variable(axis).map(|var| (*axis, var)))
        .ok_or_else(|| WeatherError::Parse {
            message: format!("{name} has no {} variable", TIME_AXES[0]),
        })?;

    let units = var
        .attribute_value("units")
        .transpose()?
        .map(String::try_from)
        .transpose()?
        .ok_or_else(|| WeatherError::Parse {
            message: format!("{name}: {axis} has no units"),
        })?;
    let (unit_seconds, epoch) = parse_time_units(&units)?;

    let times = var
        .get_values::<f64, _>(..)?
        .into_iter()
        .map(|value| offset_time(epoch, value * unit_seconds))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((axis, times))
}

/// Parses CF units such as `seconds since 1970-01-01` or
/// `hours since 1900-01-01 00:00:00.0` into seconds per unit and epoch.
fn parse_time_units(units: &str) -> Result<(f64, NaiveDateTime), WeatherError> {
    let invalid = || WeatherError::Parse {
        message: format!("unsupported time units {units:?}"),
    };

    let (unit, epoch) = units.split_once(" since ").ok_or_else(invalid)?;
    let unit_seconds = match unit.trim() {
        "seconds" | "second" | "s" => 1.0,
        "minutes" | "minute" => 60.0,
        "hours" | "hour" | "h" => 3600.0,
        "days" | "day" | "d" => 86_400.0,
        _ => return Err(invalid()),
    };

    let epoch = epoch.trim().trim_end_matches('Z').replace('T', " ");
    let epoch = epoch.split('.').next().unwrap_or_default();
    let parsed = NaiveDateTime::parse_from_str(epoch, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(epoch, "%Y-%m-%d %H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(epoch, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(invalid)?;

    Ok((unit_seconds, parsed))
}

#[allow(clippy::cast_possible_truncation)]
fn offset_time(epoch: NaiveDateTime, seconds: f64) -> Result<NaiveDateTime, WeatherError> {
    let out_of_range = || WeatherError::Parse {
        message: format!("time offset {seconds}s from {epoch} is out of range"),
    };
    if !seconds.is_finite() {
        return Err(out_of_range());
    }
    TimeDelta::try_seconds(seconds.round() as i64)
        .and_then(|delta| epoch.checked_add_signed(delta))
        .ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use heating_emissions_weather_models::WeatherDataset;
    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::open_archive;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("heating_emissions_nc_{name}"))
    }

    fn put_f64(file: &mut netcdf::FileMut, name: &str, dims: &[&str], values: &[f64]) {
        let mut var = file.add_variable::<f64>(name, dims).unwrap();
        var.put_values(values, ..).unwrap();
    }

    fn put_f32(file: &mut netcdf::FileMut, name: &str, dims: &[&str], values: &[f32]) {
        let mut var = file.add_variable::<f32>(name, dims).unwrap();
        var.put_values(values, ..).unwrap();
    }

    /// New-style instant member: int64 seconds since 1970, one fill value.
    fn instant_member() -> Vec<u8> {
        let path = temp_path("instant.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            file.add_dimension("valid_time", 2).unwrap();
            file.add_dimension(LATITUDE, 2).unwrap();
            file.add_dimension(LONGITUDE, 1).unwrap();

            let mut time = file.add_variable::<i64>("valid_time", &["valid_time"]).unwrap();
            time.put_attribute("units", "seconds since 1970-01-01").unwrap();
            time.put_values(&[1_640_995_200_i64, 1_640_998_800], ..).unwrap();

            put_f64(&mut file, LATITUDE, &[LATITUDE], &[48.5, 48.25]);
            put_f64(&mut file, LONGITUDE, &[LONGITUDE], &[12.0]);

            let dims = ["valid_time", LATITUDE, LONGITUDE];
            put_f32(&mut file, "t2m", &dims, &[273.15, 275.15, 274.15, 276.15]);
            put_f32(&mut file, "sp", &dims, &[100_000.0; 4]);
            put_f32(&mut file, "u10", &dims, &[3.0, 0.0, 0.0, 0.0]);
            put_f32(&mut file, "v10", &dims, &[4.0, 0.0, 1.0, 0.0]);

            let mut d2m = file.add_variable::<f32>("d2m", &dims).unwrap();
            d2m.set_fill_value(-9999.0_f32).unwrap();
            d2m.put_values(&[270.0_f32, 271.0, 270.0, -9999.0], ..).unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        bytes
    }

    /// Old-style accumulated member: hours since 1900, packed `ssrd` with a
    /// singleton ensemble dimension.
    fn accumulated_member() -> Vec<u8> {
        let path = temp_path("accum.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            file.add_dimension("time", 2).unwrap();
            file.add_dimension("number", 1).unwrap();
            file.add_dimension(LATITUDE, 2).unwrap();
            file.add_dimension(LONGITUDE, 1).unwrap();

            let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
            time.put_attribute("units", "hours since 1900-01-01 00:00:00.0").unwrap();
            time.put_values(&[1_069_440.0, 1_069_441.0], ..).unwrap();

            put_f64(&mut file, LATITUDE, &[LATITUDE], &[48.5, 48.25]);
            put_f64(&mut file, LONGITUDE, &[LONGITUDE], &[12.0]);

            let mut ssrd = file
                .add_variable::<i16>("ssrd", &["time", "number", LATITUDE, LONGITUDE])
                .unwrap();
            ssrd.put_attribute("scale_factor", 0.5).unwrap();
            ssrd.put_attribute("add_offset", 0.0).unwrap();
            ssrd.put_values(&[7200_i16, 0, 14_400, 0], ..).unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        bytes
    }

    fn open_zip(name: &str, members: &[(&str, Vec<u8>)]) -> Result<WeatherDataset, WeatherError> {
        let path = temp_path(&format!("{name}.zip"));
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        for (member, contents) in members {
            zip.start_file(*member, SimpleFileOptions::default()).unwrap();
            zip.write_all(contents).unwrap();
        }
        zip.finish().unwrap();

        let dataset = open_archive(&path);
        let _ = std::fs::remove_file(&path);
        dataset
    }

    #[test]
    fn reads_delivered_members() {
        let dataset = open_zip(
            "delivered",
            &[
                ("data_stream-oper_stepType-instant.nc", instant_member()),
                ("data_stream-oper_stepType-accum.nc", accumulated_member()),
            ],
        )
        .unwrap();

        // The filled dew point drops one of the four records.
        assert_eq!(dataset.samples.len(), 3);
        assert_eq!(dataset.points().len(), 2);

        let first = dataset
            .samples
            .iter()
            .find(|s| s.point == WeatherPoint::new(48.5, 12.0))
            .unwrap();
        assert_eq!(
            first.time,
            NaiveDate::from_ymd_opt(2022, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
        assert!(first.temperature.abs() < 1e-4);
        assert!((first.wind_speed - 5.0).abs() < 1e-6);
        assert!((first.radiation - 1.0).abs() < 1e-9);
    }

    #[test]
    fn netcdf_and_csv_members_conflict_on_different_values() {
        let csv = b"valid_time,latitude,longitude,t2m\n2022-01-01 00:00:00,48.5,12.0,280.0\n".to_vec();
        let err = open_zip(
            "mixed_conflict",
            &[
                ("data_stream-oper_stepType-instant.nc", instant_member()),
                ("extra.csv", csv),
            ],
        )
        .unwrap_err();

        assert!(matches!(err, WeatherError::Conflict { ref variable, .. } if variable == "t2m"));
    }

    #[test]
    fn time_units() {
        let (seconds, epoch) = parse_time_units("seconds since 1970-01-01").unwrap();
        assert!((seconds - 1.0).abs() < f64::EPSILON);
        assert_eq!(
            epoch,
            NaiveDate::from_ymd_opt(1970, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );

        let (hours, epoch) = parse_time_units("hours since 1900-01-01 00:00:00.0").unwrap();
        assert!((hours - 3600.0).abs() < f64::EPSILON);
        assert_eq!(
            offset_time(epoch, 1_069_440.0 * hours).unwrap(),
            NaiveDate::from_ymd_opt(2022, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );

        assert!(parse_time_units("fortnights since 1970-01-01").is_err());
        assert!(parse_time_units("days").is_err());
    }
}

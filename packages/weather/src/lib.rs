#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Weather Data Acquisition.
//!
//! Submits monthly reanalysis retrievals to the climate data store, polls
//! them under a shared wall-clock deadline, caches the resulting archives
//! on disk and turns them into preprocessed [`WeatherDataset`]s.
//!
//! [`WeatherDataset`]: heating_emissions_weather_models::WeatherDataset

pub mod acquire;
pub mod archive;
pub mod cds;
#[cfg(feature = "netcdf")]
mod nc;
pub mod preprocess;
pub mod progress;
pub mod retry;

pub use acquire::{AcquisitionRequest, acquire, acquire_until, archive_path, month_batches};
pub use archive::open_archive;
pub use cds::{CdsClient, ClimateDataStore, RemoteJob};
pub use progress::{NullProgress, ProgressCallback, null_progress};

/// Errors from weather acquisition and archive reading.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    /// The acquisition did not finish before the runtime limit.
    #[error(
        "ERA5 data download exceeded the time limit of {limit_minutes:.2} minutes. Temporal flexible simulation will not be computed."
    )]
    Timeout {
        /// Runtime limit in minutes.
        limit_minutes: f64,
    },

    /// Any other acquisition failure, wrapped for the end user.
    #[error("ERA5 data download failed by the following exception:\n{message}")]
    Service {
        /// Underlying cause.
        message: String,
    },

    /// A single download did not materialise before the deadline.
    #[error("Download of {target} timed out")]
    DeadlineExceeded {
        /// Archive path that was not written.
        target: String,
    },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The climate data store answered with an error or an unexpected body.
    #[error("Climate data store error: {message}")]
    Api {
        /// Description of the failure.
        message: String,
    },

    /// Filesystem error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Archive could not be read.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// CSV member could not be parsed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// `NetCDF` member in a build without the `netcdf` feature.
    #[error(
        "Unsupported archive member {member}: NetCDF members need the `netcdf` feature (built without it, only CSV tables can be read)"
    )]
    UnsupportedMember {
        /// Member file name.
        member: String,
    },

    /// `NetCDF` member could not be read.
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// Two archive members disagree on the same value.
    #[error("Conflicting values for {variable} at {time} ({latitude}, {longitude})")]
    Conflict {
        /// Variable short name.
        variable: String,
        /// Valid time.
        time: String,
        /// Latitude.
        latitude: f64,
        /// Longitude.
        longitude: f64,
    },

    /// Malformed value in an archive member.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the failure.
        message: String,
    },
}

impl WeatherError {
    /// Whether the message should be shown to the end user as-is.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Service { .. })
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

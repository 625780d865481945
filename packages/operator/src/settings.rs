//! Runtime settings.
//!
//! Loaded from an optional TOML file, then overridden from the
//! environment:
//!
//! | Variable | Setting |
//! |---|---|
//! | `HEATING_EMISSIONS_DATABASE` | census `DuckDB` file |
//! | `HEATING_EMISSIONS_WEATHER_DIR` | reanalysis archive cache |
//! | `CDSAPI_URL` | climate data store API root |
//! | `CDSAPI_KEY` | climate data store personal access token |

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use heating_emissions_database::paths;
use serde::{Deserialize, Serialize};

use crate::OperatorError;

/// Default climate data store API root.
pub const DEFAULT_CDSAPI_URL: &str = "https://cds.climate.copernicus.eu/api";

/// Default wall-clock budget of the temporal branch.
pub const DEFAULT_RUNTIME_LIMIT_SECS: u64 = 28 * 60;

/// Operator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Census `DuckDB` file.
    pub database: PathBuf,
    /// Directory holding cached reanalysis archives.
    pub weather_dir: PathBuf,
    /// Climate data store API root.
    pub cdsapi_url: String,
    /// Climate data store personal access token. Temporal downscaling is
    /// unavailable without it.
    pub cdsapi_key: Option<String>,
    /// Budget for download and downscaling, in seconds.
    pub runtime_limit_secs: u64,
    /// First month downscaled.
    pub first_month: u32,
    /// Last month downscaled.
    pub last_month: u32,
    /// Interval between job readiness checks, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: paths::census_db_path(),
            weather_dir: paths::weather_dir(),
            cdsapi_url: DEFAULT_CDSAPI_URL.to_string(),
            cdsapi_key: None,
            runtime_limit_secs: DEFAULT_RUNTIME_LIMIT_SECS,
            first_month: 1,
            last_month: 12,
            poll_interval_ms: 1000,
        }
    }
}

impl Settings {
    /// Loads settings from `path` (if given) and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError`] if the file cannot be read or parsed, or
    /// the resulting settings are invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, OperatorError> {
        let mut settings = match path {
            Some(path) => {
                log::debug!("Reading settings from {}", path.display());
                let text = std::fs::read_to_string(path).map_err(|e| OperatorError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        settings.apply_env(|name| std::env::var(name).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from TOML; absent keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::Config`] if the text is not valid.
    pub fn from_toml_str(text: &str) -> Result<Self, OperatorError> {
        toml::from_str(text).map_err(|e| OperatorError::Config {
            message: e.to_string(),
        })
    }

    /// Overrides settings from environment variables looked up by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("HEATING_EMISSIONS_DATABASE") {
            self.database = PathBuf::from(v);
        }
        if let Some(v) = lookup("HEATING_EMISSIONS_WEATHER_DIR") {
            self.weather_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CDSAPI_URL") {
            self.cdsapi_url = v;
        }
        if let Some(v) = lookup("CDSAPI_KEY").filter(|k| !k.is_empty()) {
            self.cdsapi_key = Some(v);
        }
    }

    /// Checks the month range.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::Config`] unless `1 <= first <= last <= 12`.
    pub fn validate(&self) -> Result<(), OperatorError> {
        if !(1..=12).contains(&self.first_month)
            || !(1..=12).contains(&self.last_month)
            || self.first_month > self.last_month
        {
            return Err(OperatorError::Config {
                message: format!(
                    "invalid month range {}..={}",
                    self.first_month, self.last_month
                ),
            });
        }
        Ok(())
    }

    /// Wall-clock budget of the temporal branch.
    #[must_use]
    pub const fn runtime_limit(&self) -> Duration {
        Duration::from_secs(self.runtime_limit_secs)
    }

    /// Months downscaled.
    #[must_use]
    pub const fn months(&self) -> RangeInclusive<u32> {
        self.first_month..=self.last_month
    }

    /// Interval between job readiness checks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

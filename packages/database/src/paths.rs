#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the local data directory.
//!
//! All paths are relative to the project root's `data/` directory.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`. Falls back to the
/// current directory if the manifest directory has fewer than two ancestors.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the path of the census `DuckDB` file.
#[must_use]
pub fn census_db_path() -> PathBuf {
    data_dir().join("census.duckdb")
}

/// Returns the `data/weather/` directory for cached reanalysis archives.
#[must_use]
pub fn weather_dir() -> PathBuf {
    data_dir().join("weather")
}

/// Returns the `data/output/` directory for exported results.
#[must_use]
pub fn output_dir() -> PathBuf {
    data_dir().join("output")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

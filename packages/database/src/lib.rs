#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `DuckDB` storage for the gridded German census tables.
//!
//! Each table lives in the `census_de` schema and is keyed by the 100 m
//! raster cell identifier `raster_id_100m`. The grid table carries the cell
//! centroid in both WGS84 and EPSG:3035 so bounding-box pre-filtering can be
//! done in SQL.

pub mod census_db;
pub mod paths;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` query error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

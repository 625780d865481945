//! Embedded German national boundary.
//!
//! A `MultiPolygon` of the mainland plus the inhabited North Sea and Baltic
//! islands, generalised to a few hundred metres along the borders. It is only
//! used to reject areas outside Germany, never for clipping.

use geo::{Intersects, MultiPolygon};

use crate::{Aoi, SpatialError};

const BOUNDARY_GEOJSON: &str = include_str!("../resources/germany_boundary.geojson");

/// Parses the embedded boundary.
///
/// # Errors
///
/// Returns [`SpatialError`] if the embedded `GeoJSON` is malformed.
pub fn boundary() -> Result<MultiPolygon<f64>, SpatialError> {
    Aoi::from_geojson_str("Germany", BOUNDARY_GEOJSON).map(|aoi| aoi.geometry)
}

/// Whether `geometry` touches German territory.
///
/// # Errors
///
/// Returns [`SpatialError`] if the embedded boundary cannot be parsed.
pub fn intersects(geometry: &MultiPolygon<f64>) -> Result<bool, SpatialError> {
    Ok(boundary()?.intersects(geometry))
}

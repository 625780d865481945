#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry helpers for area-of-interest handling.
//!
//! Parses the AOI polygon from `GeoJSON`, checks it against the German
//! national boundary, measures it in a metric projection and provides an
//! R-tree index for nearest-point assignment between the census grid and
//! the reanalysis grid.

pub mod germany;
pub mod nearest;
pub mod utm;

use geo::{BoundingRect, Contains, MultiPolygon, Point};
use geojson::GeoJson;

pub use nearest::NearestIndex;
pub use utm::{UtmZone, area_km2_utm32n};

/// Errors from geometry parsing and projection.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// `GeoJSON` could not be parsed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The geometry contained no polygons.
    #[error("Geometry for {name} contains no polygons")]
    EmptyGeometry {
        /// AOI name.
        name: String,
    },

    /// Geometry type or coordinates could not be used.
    #[error("Geometry conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// The user-selected area of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct Aoi {
    /// Display name, used in messages and in weather cache file names.
    pub name: String,
    /// AOI polygon(s) in WGS84 longitude/latitude.
    pub geometry: MultiPolygon<f64>,
}

impl Aoi {
    /// Creates an AOI from an existing geometry.
    #[must_use]
    pub fn new(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            name: name.into(),
            geometry,
        }
    }

    /// Parses an AOI from a `GeoJSON` geometry, feature, or feature
    /// collection. Every polygon found is merged into one multipolygon.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the text is not valid `GeoJSON` or holds
    /// no polygon geometry.
    pub fn from_geojson_str(
        name: impl Into<String>,
        geojson_str: &str,
    ) -> Result<Self, SpatialError> {
        let name = name.into();
        let geojson: GeoJson = geojson_str.parse()?;

        let geometries: Vec<geojson::Geometry> = match geojson {
            GeoJson::Geometry(geom) => vec![geom],
            GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
            GeoJson::FeatureCollection(collection) => collection
                .features
                .into_iter()
                .filter_map(|f| f.geometry)
                .collect(),
        };

        let mut polygons = Vec::new();
        for geom in geometries {
            let geo_geom: geo::Geometry<f64> =
                geom.try_into().map_err(|e: geojson::Error| SpatialError::Conversion {
                    message: e.to_string(),
                })?;
            match geo_geom {
                geo::Geometry::Polygon(p) => polygons.push(p),
                geo::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
                other => {
                    log::warn!("Ignoring non-polygon geometry in AOI {name}: {other:?}");
                }
            }
        }

        if polygons.is_empty() {
            return Err(SpatialError::EmptyGeometry { name });
        }

        Ok(Self {
            name,
            geometry: MultiPolygon(polygons),
        })
    }

    /// Bounding box of the AOI geometry.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyGeometry`] if the geometry has no
    /// coordinates.
    pub fn bounding_box(&self) -> Result<BoundingBox, SpatialError> {
        BoundingBox::of(&self.geometry).ok_or_else(|| SpatialError::EmptyGeometry {
            name: self.name.clone(),
        })
    }

    /// Whether a WGS84 point lies inside the AOI.
    #[must_use]
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        contains_point(&self.geometry, lon, lat)
    }
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum longitude.
    pub west: f64,
    /// Minimum latitude.
    pub south: f64,
    /// Maximum longitude.
    pub east: f64,
    /// Maximum latitude.
    pub north: f64,
}

impl BoundingBox {
    /// Bounding box of a multipolygon, or `None` if it is empty.
    #[must_use]
    pub fn of(geometry: &MultiPolygon<f64>) -> Option<Self> {
        geometry.bounding_rect().map(|rect| Self {
            west: rect.min().x,
            south: rect.min().y,
            east: rect.max().x,
            north: rect.max().y,
        })
    }

    /// Grows the box by `eps` degrees on every side.
    #[must_use]
    pub fn buffered(self, eps: f64) -> Self {
        Self {
            west: self.west - eps,
            south: self.south - eps,
            east: self.east + eps,
            north: self.north + eps,
        }
    }

    /// Box centre as `(lon, lat)`.
    #[must_use]
    pub fn center(self) -> (f64, f64) {
        (
            f64::midpoint(self.west, self.east),
            f64::midpoint(self.south, self.north),
        )
    }

    /// Area in the order the climate data store expects:
    /// `[north, west, south, east]`.
    #[must_use]
    pub const fn to_cds_area(self) -> [f64; 4] {
        [self.north, self.west, self.south, self.east]
    }
}

/// Whether a WGS84 point lies inside `geometry`.
#[must_use]
pub fn contains_point(geometry: &MultiPolygon<f64>, lon: f64, lat: f64) -> bool {
    geometry.contains(&Point::new(lon, lat))
}

//! WGS84 to UTM projection.
//!
//! Forward transverse Mercator using the Krüger series to third order in
//! the third flattening, which is accurate to well under a millimetre
//! inside a zone.

use geo::{Area, Coord, MapCoords, MultiPolygon};

use crate::BoundingBox;

const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_223_563;
const SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A UTM zone (1-60) and hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    /// Zone number, 1-60.
    pub number: u8,
    /// Northern hemisphere.
    pub north: bool,
}

impl UtmZone {
    /// Zone 32N, which covers most of Germany.
    pub const ZONE_32N: Self = Self {
        number: 32,
        north: true,
    };

    /// Zone containing the point.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn for_point(lon: f64, lat: f64) -> Self {
        let number = ((lon + 180.0) / 6.0).floor().clamp(0.0, 59.0) as u8 + 1;
        Self {
            number,
            north: lat >= 0.0,
        }
    }

    /// Best-fit zone for an area: the zone of its bounding-box centre.
    #[must_use]
    pub fn estimate(bbox: &BoundingBox) -> Self {
        let (lon, lat) = bbox.center();
        Self::for_point(lon, lat)
    }

    /// EPSG code of this zone on WGS84.
    #[must_use]
    pub fn epsg(self) -> u32 {
        let base = if self.north { 32_600 } else { 32_700 };
        base + u32::from(self.number)
    }

    fn central_meridian(self) -> f64 {
        f64::from(self.number) * 6.0 - 183.0
    }

    /// Projects a WGS84 point to `(easting, northing)` in metres.
    #[must_use]
    pub fn project(self, lon: f64, lat: f64) -> (f64, f64) {
        let n = FLATTENING / (2.0 - FLATTENING);
        let n2 = n * n;
        let n3 = n2 * n;
        let rectifying_radius = SEMI_MAJOR_AXIS / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);
        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
            61.0 * n3 / 240.0,
        ];

        let phi = lat.to_radians();
        let lambda = (lon - self.central_meridian()).to_radians();

        let c = 2.0 * n.sqrt() / (1.0 + n);
        let sin_phi = phi.sin();
        let t = (sin_phi.atanh() - c * (c * sin_phi).atanh()).sinh();
        let xi = t.atan2(lambda.cos());
        let eta = (lambda.sin() / t.mul_add(t, 1.0).sqrt()).atanh();

        let mut easting_series = eta;
        let mut northing_series = xi;
        for (a, k) in alpha.iter().zip([2.0, 4.0, 6.0]) {
            easting_series += a * (k * xi).cos() * (k * eta).sinh();
            northing_series += a * (k * xi).sin() * (k * eta).cosh();
        }

        let false_northing = if self.north { 0.0 } else { FALSE_NORTHING_SOUTH };

        (
            SCALE_FACTOR.mul_add(rectifying_radius * easting_series, FALSE_EASTING),
            SCALE_FACTOR.mul_add(rectifying_radius * northing_series, false_northing),
        )
    }

    /// Projects every vertex of `geometry`.
    #[must_use]
    pub fn project_multipolygon(self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        geometry.map_coords(|c| {
            let (x, y) = self.project(c.x, c.y);
            Coord { x, y }
        })
    }
}

/// Area of a WGS84 geometry in km², measured in UTM zone 32N.
#[must_use]
pub fn area_km2_utm32n(geometry: &MultiPolygon<f64>) -> f64 {
    UtmZone::ZONE_32N
        .project_multipolygon(geometry)
        .unsigned_area()
        / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use geo::{Rect, coord};

    use super::*;

    fn rect(west: f64, south: f64, east: f64, north: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![
            Rect::new(coord! { x: west, y: south }, coord! { x: east, y: north }).to_polygon(),
        ])
    }

    #[test]
    fn zone_for_germany() {
        assert_eq!(UtmZone::for_point(11.5, 48.1), UtmZone::ZONE_32N);
        assert_eq!(UtmZone::for_point(13.4, 52.5).number, 33);
        assert_eq!(UtmZone::for_point(-3.7, -40.0).epsg(), 32_730);
        assert_eq!(UtmZone::for_point(180.0, 0.0).number, 60);
    }

    #[test]
    fn central_meridian_on_false_easting() {
        let (e, n) = UtmZone::ZONE_32N.project(9.0, 0.0);
        assert!((e - 500_000.0).abs() < 1e-6);
        assert!(n.abs() < 1e-6);

        let (_, n) = UtmZone::ZONE_32N.project(9.0, 48.0);
        assert!((n - 5_316_300.2).abs() < 1.0);
    }

    #[test]
    fn projects_munich() {
        let (e, n) = UtmZone::ZONE_32N.project(11.575, 48.137);
        assert!((e - 691_567.3).abs() < 1.0);
        assert!((n - 5_334_734.3).abs() < 1.0);
    }

    #[test]
    fn area_of_small_aoi() {
        let area = area_km2_utm32n(&rect(12.3, 48.22, 12.48, 48.34));
        assert!((area - 178.4).abs() < 0.5);
    }

    #[test]
    fn area_of_large_aoi() {
        let area = area_km2_utm32n(&rect(9.0, 49.0, 12.0, 51.0));
        assert!(area > 30_000.0);
        assert!((area - 47_812.0).abs() < 10.0);
    }
}

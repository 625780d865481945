//! Assigns every census cell to its nearest weather grid point.

use std::collections::BTreeMap;

use heating_emissions_census_models::{CalculatedCell, CellId, CensusTable};
use heating_emissions_spatial::{BoundingBox, NearestIndex, UtmZone};
use heating_emissions_weather_models::WeatherPoint;

/// Bounding box of the cell centroids.
fn cell_extent(cells: &CensusTable<CalculatedCell>) -> Option<BoundingBox> {
    cells.values().fold(None, |acc: Option<BoundingBox>, c| {
        let (lon, lat) = (c.cell.longitude, c.cell.latitude);
        Some(acc.map_or(
            BoundingBox {
                west: lon,
                south: lat,
                east: lon,
                north: lat,
            },
            |b| BoundingBox {
                west: b.west.min(lon),
                south: b.south.min(lat),
                east: b.east.max(lon),
                north: b.north.max(lat),
            },
        ))
    })
}

/// Maps each cell to the closest of `points`.
///
/// Distances are measured in the UTM zone of the cells' extent. Duplicate
/// points are indexed once. Returns an empty map when either side is
/// empty.
#[must_use]
pub fn assign_nearest_weather_points(
    cells: &CensusTable<CalculatedCell>,
    points: &[WeatherPoint],
) -> BTreeMap<CellId, WeatherPoint> {
    let Some(extent) = cell_extent(cells) else {
        return BTreeMap::new();
    };
    let zone = UtmZone::estimate(&extent);

    let mut unique = points.to_vec();
    unique.sort_unstable();
    unique.dedup();

    let index = NearestIndex::new(unique.into_iter().map(|p| {
        let (x, y) = zone.project(p.longitude(), p.latitude());
        (x, y, p)
    }));

    log::debug!(
        "Joining {} cells to {} weather points in EPSG:{}",
        cells.len(),
        index.len(),
        zone.epsg()
    );

    cells
        .iter()
        .filter_map(|(id, c)| {
            let (x, y) = zone.project(c.cell.longitude, c.cell.latitude);
            index.nearest(x, y).map(|p| (id.clone(), *p))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use heating_emissions_census_models::GridCell;

    use super::*;

    pub(crate) fn calculated(
        id: &str,
        lon: f64,
        lat: f64,
        population: f64,
        factor: f64,
    ) -> CalculatedCell {
        CalculatedCell {
            cell: GridCell {
                id: id.to_string(),
                longitude: lon,
                latitude: lat,
                x_mp_100m: 0,
                y_mp_100m: 0,
            },
            population,
            living_space: Some(40.0),
            heat_consumption: 100.0,
            emission_factor: factor,
        }
    }

    #[test]
    fn cells_take_the_closest_point() {
        let cells: CensusTable<CalculatedCell> = [
            ("west".to_string(), calculated("west", 12.01, 48.01, 1.0, 0.2)),
            ("east".to_string(), calculated("east", 12.24, 48.02, 1.0, 0.2)),
        ]
        .into_iter()
        .collect();
        let points = [
            WeatherPoint::new(48.0, 12.0),
            WeatherPoint::new(48.0, 12.25),
            WeatherPoint::new(48.0, 12.0),
        ];

        let assignment = assign_nearest_weather_points(&cells, &points);

        assert_eq!(assignment.len(), 2);
        assert_eq!(assignment["west"], WeatherPoint::new(48.0, 12.0));
        assert_eq!(assignment["east"], WeatherPoint::new(48.0, 12.25));
    }

    #[test]
    fn empty_inputs() {
        let cells: CensusTable<CalculatedCell> =
            [("a".to_string(), calculated("a", 12.0, 48.0, 1.0, 0.2))]
                .into_iter()
                .collect();
        assert!(assign_nearest_weather_points(&cells, &[]).is_empty());
        assert!(
            assign_nearest_weather_points(&CensusTable::new(), &[WeatherPoint::new(48.0, 12.0)])
                .is_empty()
        );
    }
}

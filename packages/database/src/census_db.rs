//! Census grid tables in `DuckDB`.
//!
//! Layout mirrors the published census extract: one grid table with cell
//! centroids, two scalar tables (population, living space) and two
//! categorical count tables (building ages, heating sources). A cell may be
//! absent from any non-grid table.

use std::collections::BTreeMap;
use std::path::Path;

use duckdb::Connection;
use heating_emissions_census_models::{Category, CategoryCounts, CellId, GridCell};

use crate::DbError;

/// Grid geometry table.
pub const GRID_TABLE: &str = "census_de.raster_grid_100m";
/// Resident population per cell.
pub const POPULATION_TABLE: &str = "census_de.population";
/// Average living space per person per cell.
pub const LIVING_SPACE_TABLE: &str = "census_de.residential_living_space";
/// Residential building counts per construction period.
pub const BUILDING_AGE_TABLE: &str = "census_de.residential_buildings_by_year";
/// Residential building counts per heating energy source.
pub const HEATING_SOURCE_TABLE: &str = "census_de.residential_heating_sources";

/// Population column in [`POPULATION_TABLE`].
pub const POPULATION_COLUMN: &str = "population";
/// Living-space column in [`LIVING_SPACE_TABLE`].
pub const LIVING_SPACE_COLUMN: &str = "average_sqm_per_person";

/// Maximum number of IDs bound into a single `IN (...)` list.
const ID_CHUNK_SIZE: usize = 1_000;

/// Opens (or creates) the census `DuckDB` and ensures the schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;

    conn.execute_batch("SET threads = 4; SET memory_limit = '512MB';")?;

    create_schema(&conn)?;

    Ok(conn)
}

/// Opens an empty in-memory census DB with the schema created.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Creates the `census_de` schema and all tables if they do not exist.
///
/// # Errors
///
/// Returns [`DbError`] if any DDL statement fails.
pub fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE SCHEMA IF NOT EXISTS census_de;

        CREATE TABLE IF NOT EXISTS census_de.raster_grid_100m (
            raster_id_100m TEXT PRIMARY KEY,
            x_mp_100m BIGINT NOT NULL,
            y_mp_100m BIGINT NOT NULL,
            longitude DOUBLE NOT NULL,
            latitude DOUBLE NOT NULL
        );

        CREATE TABLE IF NOT EXISTS census_de.population (
            raster_id_100m TEXT PRIMARY KEY,
            population DOUBLE
        );

        CREATE TABLE IF NOT EXISTS census_de.residential_living_space (
            raster_id_100m TEXT PRIMARY KEY,
            average_sqm_per_person DOUBLE
        );

        CREATE TABLE IF NOT EXISTS census_de.residential_buildings_by_year (
            raster_id_100m TEXT PRIMARY KEY,
            \"pre_1919\" DOUBLE,
            \"1919_1948\" DOUBLE,
            \"1949_1978\" DOUBLE,
            \"1979_1990\" DOUBLE,
            \"1991_2000\" DOUBLE,
            \"2001_2010\" DOUBLE,
            \"2011_2019\" DOUBLE,
            \"post_2020\" DOUBLE,
            \"unknown\" DOUBLE
        );

        CREATE TABLE IF NOT EXISTS census_de.residential_heating_sources (
            raster_id_100m TEXT PRIMARY KEY,
            gas DOUBLE,
            heating_oil DOUBLE,
            wood DOUBLE,
            biomass_biogas DOUBLE,
            solar_geothermal_heat_pumps DOUBLE,
            electricity DOUBLE,
            coal DOUBLE,
            district_heating DOUBLE,
            \"unknown\" DOUBLE
        );",
    )?;

    Ok(())
}

/// Tables that can be bulk-loaded from CSV by [`import_csv_dir`].
pub const IMPORT_TABLES: &[&str] = &[
    GRID_TABLE,
    POPULATION_TABLE,
    LIVING_SPACE_TABLE,
    BUILDING_AGE_TABLE,
    HEATING_SOURCE_TABLE,
];

/// Bulk-loads census CSV extracts from `dir` into the matching tables.
///
/// Each table is loaded from `<table name without schema>.csv` if that file
/// exists; columns are matched by name. Returns the number of rows loaded.
///
/// # Errors
///
/// Returns [`DbError`] if a CSV file cannot be read by `DuckDB` or its
/// columns do not match the table.
pub fn import_csv_dir(conn: &Connection, dir: &Path) -> Result<u64, DbError> {
    let mut total = 0u64;

    for table in IMPORT_TABLES {
        let short_name = table.trim_start_matches("census_de.");
        let csv_path = dir.join(format!("{short_name}.csv"));
        if !csv_path.exists() {
            log::debug!("  {short_name}.csv not found, skipping");
            continue;
        }

        let path_str = csv_path.display().to_string().replace('\'', "''");
        let count = conn.execute(
            &format!("INSERT OR REPLACE INTO {table} BY NAME SELECT * FROM read_csv_auto('{path_str}')"),
            [],
        )?;

        log::info!("  loaded {count} rows into {table}");
        total += count as u64;
    }

    Ok(total)
}

/// Returns all grid cells whose centroid falls in the given bounding box.
///
/// This is only the bounding-box pre-filter; exact containment against the
/// AOI polygon is left to the caller.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn query_grid_in_bbox(
    conn: &Connection,
    west: f64,
    south: f64,
    east: f64,
    north: f64,
) -> Result<Vec<GridCell>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT raster_id_100m, longitude, latitude, x_mp_100m, y_mp_100m
         FROM {GRID_TABLE}
         WHERE longitude BETWEEN ? AND ? AND latitude BETWEEN ? AND ?
         ORDER BY raster_id_100m"
    ))?;

    let rows = stmt.query_map(duckdb::params![west, east, south, north], |row| {
        Ok(GridCell {
            id: row.get(0)?,
            longitude: row.get(1)?,
            latitude: row.get(2)?,
            x_mp_100m: row.get(3)?,
            y_mp_100m: row.get(4)?,
        })
    })?;

    let mut cells = Vec::new();
    for row in rows {
        cells.push(row?);
    }

    log::debug!("Grid bbox pre-filter returned {} cells", cells.len());

    Ok(cells)
}

/// Reads one nullable numeric column for the given cell IDs.
///
/// Cells absent from the table are absent from the result; `NULL` values
/// are returned as `None`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn query_scalar(
    conn: &Connection,
    table: &str,
    column: &str,
    ids: &[CellId],
) -> Result<BTreeMap<CellId, Option<f64>>, DbError> {
    let mut result = BTreeMap::new();

    for chunk in ids.chunks(ID_CHUNK_SIZE) {
        let sql = format!(
            "SELECT raster_id_100m, CAST(\"{column}\" AS DOUBLE)
             FROM {table}
             WHERE raster_id_100m IN ({})",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params_from_iter(chunk.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<f64>>(1)?))
        })?;
        for row in rows {
            let (id, value) = row?;
            result.insert(id, value);
        }
    }

    Ok(result)
}

/// Reads the count columns of a categorical table for the given cell IDs.
///
/// Columns are taken from [`Category::all`], so the unknown bucket is
/// included. `NULL` counts become zero.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn query_category_counts<C: Category>(
    conn: &Connection,
    table: &str,
    ids: &[CellId],
) -> Result<BTreeMap<CellId, CategoryCounts<C>>, DbError> {
    let categories: Vec<C> = C::all().collect();
    let select_list = categories
        .iter()
        .map(|c| format!("CAST(\"{}\" AS DOUBLE)", c.column()))
        .collect::<Vec<_>>()
        .join(", ");

    let mut result = BTreeMap::new();

    for chunk in ids.chunks(ID_CHUNK_SIZE) {
        let sql = format!(
            "SELECT raster_id_100m, {select_list}
             FROM {table}
             WHERE raster_id_100m IN ({})",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params_from_iter(chunk.iter()), |row| {
            let id: String = row.get(0)?;
            let mut counts = CategoryCounts::new();
            for (i, category) in categories.iter().enumerate() {
                counts.set(*category, row.get::<_, Option<f64>>(i + 1)?);
            }
            Ok((id, counts))
        })?;
        for row in rows {
            let (id, counts) = row?;
            result.insert(id, counts);
        }
    }

    Ok(result)
}

/// Inserts grid cells, replacing existing rows with the same ID.
///
/// # Errors
///
/// Returns [`DbError`] if any insert fails.
pub fn insert_grid_cells(conn: &Connection, cells: &[GridCell]) -> Result<u64, DbError> {
    let mut stmt = conn.prepare(&format!(
        "INSERT OR REPLACE INTO {GRID_TABLE}
         (raster_id_100m, x_mp_100m, y_mp_100m, longitude, latitude)
         VALUES (?, ?, ?, ?, ?)"
    ))?;

    let mut total = 0u64;
    for cell in cells {
        total += stmt.execute(duckdb::params![
            cell.id,
            cell.x_mp_100m,
            cell.y_mp_100m,
            cell.longitude,
            cell.latitude
        ])? as u64;
    }

    Ok(total)
}

/// Inserts rows into a scalar table such as [`POPULATION_TABLE`].
///
/// # Errors
///
/// Returns [`DbError`] if any insert fails.
pub fn insert_scalar(
    conn: &Connection,
    table: &str,
    column: &str,
    rows: &[(CellId, Option<f64>)],
) -> Result<u64, DbError> {
    let mut stmt = conn.prepare(&format!(
        "INSERT OR REPLACE INTO {table} (raster_id_100m, \"{column}\") VALUES (?, ?)"
    ))?;

    let mut total = 0u64;
    for (id, value) in rows {
        total += stmt.execute(duckdb::params![id, value])? as u64;
    }

    Ok(total)
}

/// Inserts rows into a categorical count table.
///
/// # Errors
///
/// Returns [`DbError`] if any insert fails.
pub fn insert_category_counts<C: Category>(
    conn: &Connection,
    table: &str,
    rows: &[(CellId, CategoryCounts<C>)],
) -> Result<u64, DbError> {
    let categories: Vec<C> = C::all().collect();
    let columns = categories
        .iter()
        .map(|c| format!("\"{}\"", c.column()))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "INSERT OR REPLACE INTO {table} (raster_id_100m, {columns}) VALUES (?, {})",
        placeholders(categories.len())
    ))?;

    let mut total = 0u64;
    for (id, counts) in rows {
        let mut values: Vec<duckdb::types::Value> = Vec::with_capacity(categories.len() + 1);
        values.push(duckdb::types::Value::Text(id.clone()));
        values.extend(
            categories
                .iter()
                .map(|c| duckdb::types::Value::Double(counts.get(*c))),
        );
        total += stmt.execute(duckdb::params_from_iter(values))? as u64;
    }

    Ok(total)
}

/// Returns `"?, ?, ?"` with `n` placeholders.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use heating_emissions_census_models::{BuildingAge, EnergySource};

    use super::*;

    fn cell(id: &str, lon: f64, lat: f64) -> GridCell {
        GridCell {
            id: id.to_string(),
            longitude: lon,
            latitude: lat,
            x_mp_100m: 4_341_150,
            y_mp_100m: 2_691_750,
        }
    }

    #[test]
    fn bbox_query_filters_cells() {
        let conn = open_in_memory().unwrap();
        insert_grid_cells(
            &conn,
            &[
                cell("inside", 12.35, 48.25),
                cell("outside", 13.5, 48.25),
            ],
        )
        .unwrap();

        let cells = query_grid_in_bbox(&conn, 12.3, 48.22, 12.48, 48.34).unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].id, "inside");
        assert!((cells[0].longitude - 12.35).abs() < 1e-9);
    }

    #[test]
    fn scalar_query_keeps_nulls_and_skips_absent() {
        let conn = open_in_memory().unwrap();
        insert_scalar(
            &conn,
            POPULATION_TABLE,
            POPULATION_COLUMN,
            &[("a".to_string(), Some(31.0)), ("b".to_string(), None)],
        )
        .unwrap();

        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values = query_scalar(&conn, POPULATION_TABLE, POPULATION_COLUMN, &ids).unwrap();
        assert_eq!(values.get("a"), Some(&Some(31.0)));
        assert_eq!(values.get("b"), Some(&None));
        assert!(!values.contains_key("c"));
    }

    #[test]
    fn category_query_reads_every_column() {
        let conn = open_in_memory().unwrap();
        let counts = CategoryCounts::new()
            .with(BuildingAge::From1919To1948, 3.0)
            .with(BuildingAge::Unknown, 1.0);
        insert_category_counts(&conn, BUILDING_AGE_TABLE, &[("a".to_string(), counts.clone())])
            .unwrap();

        let result: BTreeMap<CellId, CategoryCounts<BuildingAge>> =
            query_category_counts(&conn, BUILDING_AGE_TABLE, &["a".to_string()]).unwrap();
        let read = result.get("a").unwrap();
        assert!((read.get(BuildingAge::From1919To1948) - 3.0).abs() < 1e-9);
        assert!((read.get(BuildingAge::Unknown) - 1.0).abs() < 1e-9);
        assert!(read.get(BuildingAge::Pre1919).abs() < 1e-9);
    }

    #[test]
    fn energy_source_table_round_trips_columns() {
        let conn = open_in_memory().unwrap();
        let counts = CategoryCounts::new().with(EnergySource::DistrictHeating, 7.0);
        insert_category_counts(&conn, HEATING_SOURCE_TABLE, &[("x".to_string(), counts)])
            .unwrap();

        let result: BTreeMap<CellId, CategoryCounts<EnergySource>> =
            query_category_counts(&conn, HEATING_SOURCE_TABLE, &["x".to_string()]).unwrap();
        assert_eq!(
            result.get("x").unwrap().dominant(),
            Some(EnergySource::DistrictHeating)
        );
    }

    #[test]
    fn import_skips_missing_files() {
        let conn = open_in_memory().unwrap();
        let tmp = std::env::temp_dir().join("heating_emissions_import_empty");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        assert_eq!(import_csv_dir(&conn, &tmp).unwrap(), 0);

        let _ = std::fs::remove_dir_all(&tmp);
    }
}

use std::str::FromStr;

use rusqlite::{params, Connection};

use super::{fmt_datetime, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::ServicePoint;
use crate::models::filters::DisplayFilter;
use crate::models::queue_display::{DisplaySettings, QueueDisplay};

const DISPLAY_COLUMNS: &str =
    "id, display_code, display_name, facility_id, service_points, is_active, settings,
     created_at, updated_at";

pub fn insert_queue_display(conn: &Connection, display: &QueueDisplay) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO queue_displays (id, display_code, display_name, facility_id, service_points,
         is_active, settings, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            display.id.to_string(),
            display.display_code,
            display.display_name,
            display.facility_id.to_string(),
            service_points_to_json(&display.service_points)?,
            display.is_active as i32,
            settings_to_json(&display.settings)?,
            fmt_datetime(&display.created_at),
            fmt_datetime(&display.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_queue_display(conn: &Connection, display: &QueueDisplay) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE queue_displays SET display_name = ?1, service_points = ?2, is_active = ?3,
         settings = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            display.display_name,
            service_points_to_json(&display.service_points)?,
            display.is_active as i32,
            settings_to_json(&display.settings)?,
            fmt_datetime(&display.updated_at),
            display.id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "queue_display".into(),
            id: display.id.to_string(),
        });
    }
    Ok(())
}

pub fn get_display_by_code(
    conn: &Connection,
    display_code: &str,
) -> Result<Option<QueueDisplay>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DISPLAY_COLUMNS} FROM queue_displays WHERE display_code = ?1"
    ))?;
    let result = stmt.query_row(params![display_code], row_to_display_row);
    match result {
        Ok(row) => Ok(Some(display_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_queue_displays(
    conn: &Connection,
    filter: &DisplayFilter,
) -> Result<Vec<QueueDisplay>, DatabaseError> {
    let mut sql = format!("SELECT {DISPLAY_COLUMNS} FROM queue_displays WHERE 1=1");
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    if let Some(facility_id) = filter.facility_id {
        sql.push_str(" AND facility_id = ?");
        args.push(Box::new(facility_id.to_string()));
    }
    if filter.active_only {
        sql.push_str(" AND is_active = 1");
    }
    sql.push_str(" ORDER BY display_code ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args), row_to_display_row)?;
    rows.collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(display_from_row)
        .collect()
}

fn service_points_to_json(points: &[ServicePoint]) -> Result<String, DatabaseError> {
    let names: Vec<&str> = points.iter().map(|sp| sp.as_str()).collect();
    serde_json::to_string(&names).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn settings_to_json(settings: &DisplaySettings) -> Result<String, DatabaseError> {
    serde_json::to_string(settings).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

// Internal row type for QueueDisplay mapping
struct DisplayRow {
    id: String,
    display_code: String,
    display_name: String,
    facility_id: String,
    service_points: String,
    is_active: i32,
    settings: String,
    created_at: String,
    updated_at: String,
}

fn row_to_display_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DisplayRow> {
    Ok(DisplayRow {
        id: row.get(0)?,
        display_code: row.get(1)?,
        display_name: row.get(2)?,
        facility_id: row.get(3)?,
        service_points: row.get(4)?,
        is_active: row.get(5)?,
        settings: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn display_from_row(row: DisplayRow) -> Result<QueueDisplay, DatabaseError> {
    let names: Vec<String> = serde_json::from_str(&row.service_points)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    let service_points = names
        .iter()
        .map(|s| ServicePoint::from_str(s))
        .collect::<Result<Vec<_>, _>>()?;
    let settings: DisplaySettings = serde_json::from_str(&row.settings)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    Ok(QueueDisplay {
        id: parse_uuid(&row.id)?,
        display_code: row.display_code,
        display_name: row.display_name,
        facility_id: parse_uuid(&row.facility_id)?,
        service_points,
        is_active: row.is_active != 0,
        settings,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{fmt_date, fmt_datetime, parse_date, parse_opt_datetime, parse_opt_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::{Priority, QueueStatus, ServicePoint};
use crate::models::filters::QueueFilter;
use crate::models::queue_entry::QueueEntry;

const QUEUE_ENTRY_COLUMNS: &str =
    "id, ticket_number, queue_date, service_point, status, priority, sequence_number,
     created_at, called_at, service_started_at, service_ended_at,
     estimated_wait_minutes, actual_wait_minutes, service_duration_minutes, call_count,
     room_number, notes, patient_id, encounter_id, facility_id, department_id,
     serving_user_id, created_by_id, previous_queue_id, next_service_point,
     transfer_reason, skip_reason";

/// Insert a queue entry. Uniqueness of (facility, date, ticket) and
/// (facility, service point, date, sequence) is enforced by the schema.
pub fn insert_queue_entry(conn: &Connection, entry: &QueueEntry) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO queue_entries (id, ticket_number, queue_date, service_point, status, priority,
         sequence_number, created_at, called_at, service_started_at, service_ended_at,
         estimated_wait_minutes, actual_wait_minutes, service_duration_minutes, call_count,
         room_number, notes, patient_id, encounter_id, facility_id, department_id,
         serving_user_id, created_by_id, previous_queue_id, next_service_point,
         transfer_reason, skip_reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
        params![
            entry.id.to_string(),
            entry.ticket_number,
            fmt_date(&entry.queue_date),
            entry.service_point.as_str(),
            entry.status.as_str(),
            entry.priority.value(),
            entry.sequence_number,
            fmt_datetime(&entry.created_at),
            entry.called_at.as_ref().map(fmt_datetime),
            entry.service_started_at.as_ref().map(fmt_datetime),
            entry.service_ended_at.as_ref().map(fmt_datetime),
            entry.estimated_wait_minutes,
            entry.actual_wait_minutes,
            entry.service_duration_minutes,
            entry.call_count,
            entry.room_number,
            entry.notes,
            entry.patient_id.to_string(),
            entry.encounter_id.map(|id| id.to_string()),
            entry.facility_id.to_string(),
            entry.department_id.map(|id| id.to_string()),
            entry.serving_user_id.map(|id| id.to_string()),
            entry.created_by_id.to_string(),
            entry.previous_queue_id.map(|id| id.to_string()),
            entry.next_service_point.map(|sp| sp.as_str()),
            entry.transfer_reason,
            entry.skip_reason,
        ],
    )?;
    Ok(())
}

pub fn get_queue_entry(conn: &Connection, id: &Uuid) -> Result<Option<QueueEntry>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUEUE_ENTRY_COLUMNS} FROM queue_entries WHERE id = ?1"
    ))?;

    let result = stmt.query_row(params![id.to_string()], row_to_entry_row);
    match result {
        Ok(row) => Ok(Some(entry_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List entries matching the filter, ordered for service: lowest
/// priority value first, then earliest arrival (sequence number).
pub fn list_queue_entries(
    conn: &Connection,
    filter: &QueueFilter,
) -> Result<Vec<QueueEntry>, DatabaseError> {
    let mut sql = format!("SELECT {QUEUE_ENTRY_COLUMNS} FROM queue_entries WHERE 1=1");
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(facility_id) = filter.facility_id {
        sql.push_str(" AND facility_id = ?");
        args.push(Box::new(facility_id.to_string()));
    }
    if let Some(service_point) = filter.service_point {
        sql.push_str(" AND service_point = ?");
        args.push(Box::new(service_point.as_str()));
    }
    if let Some(status) = filter.status {
        sql.push_str(" AND status = ?");
        args.push(Box::new(status.as_str()));
    }
    if let Some(department_id) = filter.department_id {
        sql.push_str(" AND department_id = ?");
        args.push(Box::new(department_id.to_string()));
    }
    if let Some(queue_date) = filter.queue_date {
        sql.push_str(" AND queue_date = ?");
        args.push(Box::new(fmt_date(&queue_date)));
    }
    sql.push_str(" ORDER BY priority ASC, sequence_number ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args), row_to_entry_row)?;
    rows.collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(entry_from_row)
        .collect()
}

/// Write the entry's mutable fields, but only if the stored status still
/// matches `expected`. Returns false when another writer got there
/// first; the caller decides whether to re-read or give up.
pub fn update_queue_entry_if_status(
    conn: &Connection,
    entry: &QueueEntry,
    expected: QueueStatus,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE queue_entries SET status = ?1, sequence_number = ?2, called_at = ?3,
         service_started_at = ?4, service_ended_at = ?5, actual_wait_minutes = ?6,
         service_duration_minutes = ?7, call_count = ?8, room_number = ?9,
         serving_user_id = ?10, next_service_point = ?11, transfer_reason = ?12,
         skip_reason = ?13, encounter_id = ?14, notes = ?15
         WHERE id = ?16 AND status = ?17",
        params![
            entry.status.as_str(),
            entry.sequence_number,
            entry.called_at.as_ref().map(fmt_datetime),
            entry.service_started_at.as_ref().map(fmt_datetime),
            entry.service_ended_at.as_ref().map(fmt_datetime),
            entry.actual_wait_minutes,
            entry.service_duration_minutes,
            entry.call_count,
            entry.room_number,
            entry.serving_user_id.map(|id| id.to_string()),
            entry.next_service_point.map(|sp| sp.as_str()),
            entry.transfer_reason,
            entry.skip_reason,
            entry.encounter_id.map(|id| id.to_string()),
            entry.notes,
            entry.id.to_string(),
            expected.as_str(),
        ],
    )?;
    Ok(changed == 1)
}

/// Highest sequence number handed out so far for the partition, 0 when
/// the partition is empty.
pub fn max_sequence_number(
    conn: &Connection,
    facility_id: &Uuid,
    service_point: ServicePoint,
    queue_date: &NaiveDate,
) -> Result<i64, DatabaseError> {
    let max = conn.query_row(
        "SELECT COALESCE(MAX(sequence_number), 0) FROM queue_entries
         WHERE facility_id = ?1 AND service_point = ?2 AND queue_date = ?3",
        params![facility_id.to_string(), service_point.as_str(), fmt_date(queue_date)],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(max)
}

/// Patients currently waiting at a service point, used for estimated
/// wait at creation time.
pub fn count_waiting(
    conn: &Connection,
    facility_id: &Uuid,
    service_point: ServicePoint,
    queue_date: &NaiveDate,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM queue_entries
         WHERE facility_id = ?1 AND service_point = ?2 AND queue_date = ?3 AND status = 'waiting'",
        params![facility_id.to_string(), service_point.as_str(), fmt_date(queue_date)],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

/// Open entries (waiting, called, in service) for one patient on one
/// day, newest first. Creation uses this to block duplicates.
pub fn find_open_entries_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
    facility_id: &Uuid,
    queue_date: &NaiveDate,
) -> Result<Vec<QueueEntry>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUEUE_ENTRY_COLUMNS} FROM queue_entries
         WHERE patient_id = ?1 AND facility_id = ?2 AND queue_date = ?3
           AND status IN ('waiting', 'called', 'in_service')
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(
        params![patient_id.to_string(), facility_id.to_string(), fmt_date(queue_date)],
        row_to_entry_row,
    )?;
    rows.collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(entry_from_row)
        .collect()
}

/// Entries for a display board: called or in service at one of the
/// given service points, most recently called first.
pub fn list_board_entries(
    conn: &Connection,
    facility_id: &Uuid,
    queue_date: &NaiveDate,
    service_points: &[ServicePoint],
    limit: i64,
) -> Result<Vec<QueueEntry>, DatabaseError> {
    if service_points.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; service_points.len()].join(", ");
    let sql = format!(
        "SELECT {QUEUE_ENTRY_COLUMNS} FROM queue_entries
         WHERE facility_id = ? AND queue_date = ?
           AND status IN ('called', 'in_service')
           AND service_point IN ({placeholders})
         ORDER BY called_at DESC
         LIMIT ?"
    );
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    args.push(Box::new(facility_id.to_string()));
    args.push(Box::new(fmt_date(queue_date)));
    for sp in service_points {
        args.push(Box::new(sp.as_str()));
    }
    args.push(Box::new(limit));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args), row_to_entry_row)?;
    rows.collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(entry_from_row)
        .collect()
}

// Internal row type for QueueEntry mapping
struct QueueEntryRow {
    id: String,
    ticket_number: String,
    queue_date: String,
    service_point: String,
    status: String,
    priority: i64,
    sequence_number: i64,
    created_at: String,
    called_at: Option<String>,
    service_started_at: Option<String>,
    service_ended_at: Option<String>,
    estimated_wait_minutes: i64,
    actual_wait_minutes: Option<i64>,
    service_duration_minutes: Option<i64>,
    call_count: i64,
    room_number: Option<String>,
    notes: Option<String>,
    patient_id: String,
    encounter_id: Option<String>,
    facility_id: String,
    department_id: Option<String>,
    serving_user_id: Option<String>,
    created_by_id: String,
    previous_queue_id: Option<String>,
    next_service_point: Option<String>,
    transfer_reason: Option<String>,
    skip_reason: Option<String>,
}

fn row_to_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueEntryRow> {
    Ok(QueueEntryRow {
        id: row.get(0)?,
        ticket_number: row.get(1)?,
        queue_date: row.get(2)?,
        service_point: row.get(3)?,
        status: row.get(4)?,
        priority: row.get(5)?,
        sequence_number: row.get(6)?,
        created_at: row.get(7)?,
        called_at: row.get(8)?,
        service_started_at: row.get(9)?,
        service_ended_at: row.get(10)?,
        estimated_wait_minutes: row.get(11)?,
        actual_wait_minutes: row.get(12)?,
        service_duration_minutes: row.get(13)?,
        call_count: row.get(14)?,
        room_number: row.get(15)?,
        notes: row.get(16)?,
        patient_id: row.get(17)?,
        encounter_id: row.get(18)?,
        facility_id: row.get(19)?,
        department_id: row.get(20)?,
        serving_user_id: row.get(21)?,
        created_by_id: row.get(22)?,
        previous_queue_id: row.get(23)?,
        next_service_point: row.get(24)?,
        transfer_reason: row.get(25)?,
        skip_reason: row.get(26)?,
    })
}

fn entry_from_row(row: QueueEntryRow) -> Result<QueueEntry, DatabaseError> {
    Ok(QueueEntry {
        id: parse_uuid(&row.id)?,
        ticket_number: row.ticket_number,
        queue_date: parse_date(&row.queue_date)?,
        service_point: ServicePoint::from_str(&row.service_point)?,
        status: QueueStatus::from_str(&row.status)?,
        priority: Priority::from_value(row.priority)?,
        sequence_number: row.sequence_number,
        created_at: super::parse_datetime(&row.created_at)?,
        called_at: parse_opt_datetime(row.called_at)?,
        service_started_at: parse_opt_datetime(row.service_started_at)?,
        service_ended_at: parse_opt_datetime(row.service_ended_at)?,
        estimated_wait_minutes: row.estimated_wait_minutes,
        actual_wait_minutes: row.actual_wait_minutes,
        service_duration_minutes: row.service_duration_minutes,
        call_count: row.call_count,
        room_number: row.room_number,
        notes: row.notes,
        patient_id: parse_uuid(&row.patient_id)?,
        encounter_id: parse_opt_uuid(row.encounter_id)?,
        facility_id: parse_uuid(&row.facility_id)?,
        department_id: parse_opt_uuid(row.department_id)?,
        serving_user_id: parse_opt_uuid(row.serving_user_id)?,
        created_by_id: parse_uuid(&row.created_by_id)?,
        previous_queue_id: parse_opt_uuid(row.previous_queue_id)?,
        next_service_point: row
            .next_service_point
            .as_deref()
            .map(ServicePoint::from_str)
            .transpose()?,
        transfer_reason: row.transfer_reason,
        skip_reason: row.skip_reason,
    })
}

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{fmt_date, fmt_datetime, parse_date, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::visit::VisitRecord;

pub fn insert_visit(conn: &Connection, visit: &VisitRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO visits (id, patient_id, facility_id, visit_date, chief_complaint,
         queue_number, created_by_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            visit.id.to_string(),
            visit.patient_id.to_string(),
            visit.facility_id.to_string(),
            fmt_date(&visit.visit_date),
            visit.chief_complaint,
            visit.queue_number,
            visit.created_by_id.to_string(),
            fmt_datetime(&visit.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_visit(conn: &Connection, id: &Uuid) -> Result<Option<VisitRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, facility_id, visit_date, chief_complaint, queue_number,
         created_by_id, created_at
         FROM visits WHERE id = ?1",
    )?;
    let result = stmt.query_row(params![id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
        ))
    });
    match result {
        Ok((id, patient_id, facility_id, visit_date, complaint, queue_number, created_by, created_at)) => {
            Ok(Some(VisitRecord {
                id: parse_uuid(&id)?,
                patient_id: parse_uuid(&patient_id)?,
                facility_id: parse_uuid(&facility_id)?,
                visit_date: parse_date(&visit_date)?,
                chief_complaint: complaint,
                queue_number,
                created_by_id: parse_uuid(&created_by)?,
                created_at: parse_datetime(&created_at)?,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::patient::PatientSummary;

/// Insert a patient roster row. Registration of full demographics is the
/// patient subsystem's job; the dispatcher only needs the roster for
/// lookups and test fixtures.
pub fn insert_patient(conn: &Connection, patient: &PatientSummary) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, medical_record_number, full_name, phone)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            patient.id.to_string(),
            patient.medical_record_number,
            patient.full_name,
            patient.phone,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<PatientSummary>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, medical_record_number, full_name, phone FROM patients WHERE id = ?1",
    )?;
    let result = stmt.query_row(params![id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    });
    match result {
        Ok((id, mrn, name, phone)) => Ok(Some(PatientSummary {
            id: parse_uuid(&id)?,
            medical_record_number: mrn,
            full_name: name,
            phone,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::fmt_date;
use crate::db::DatabaseError;
use crate::models::duty::DutyAssignment;

pub fn insert_duty_assignment(
    conn: &Connection,
    duty: &DutyAssignment,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO duty_rosters (id, staff_id, facility_id, duty_date, service_point, room_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            duty.id.to_string(),
            duty.staff_id.to_string(),
            duty.facility_id.to_string(),
            fmt_date(&duty.duty_date),
            duty.service_point.map(|sp| sp.as_str()),
            duty.room_number,
        ],
    )?;
    Ok(())
}

/// Room assigned to a staff member for the day, if any.
pub fn get_duty_room(
    conn: &Connection,
    staff_id: &Uuid,
    facility_id: &Uuid,
    duty_date: &NaiveDate,
) -> Result<Option<String>, DatabaseError> {
    let result = conn.query_row(
        "SELECT room_number FROM duty_rosters
         WHERE staff_id = ?1 AND facility_id = ?2 AND duty_date = ?3
         LIMIT 1",
        params![staff_id.to_string(), facility_id.to_string(), fmt_date(duty_date)],
        |row| row.get::<_, Option<String>>(0),
    );
    match result {
        Ok(room) => Ok(room),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

use chrono::NaiveDate;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::queue::SqliteQueueStore;

/// Looks up the room a staff member works from today, so calling a
/// patient can announce a room without the operator typing one.
pub trait StaffDutyLookup: Send + Sync {
    fn room_number(
        &self,
        staff_id: &Uuid,
        facility_id: &Uuid,
        date: &NaiveDate,
    ) -> Result<Option<String>, DatabaseError>;
}

impl StaffDutyLookup for SqliteQueueStore {
    fn room_number(
        &self,
        staff_id: &Uuid,
        facility_id: &Uuid,
        date: &NaiveDate,
    ) -> Result<Option<String>, DatabaseError> {
        repository::get_duty_room(&self.lock(), staff_id, facility_id, date)
    }
}

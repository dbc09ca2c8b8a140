use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository;
use crate::db::{open_database, open_memory_database, DatabaseError};
use crate::models::enums::{QueueStatus, ServicePoint};
use crate::models::filters::{DisplayFilter, QueueFilter};
use crate::models::queue_display::QueueDisplay;
use crate::models::queue_entry::QueueEntry;

/// Persistence seam for the dispatcher. The "queue" is never held in
/// memory — every read derives it from the persisted entries, so any
/// instance can serve any request and a crash loses nothing.
pub trait QueueStore: Send + Sync {
    fn insert_entry(&self, entry: &QueueEntry) -> Result<(), DatabaseError>;
    fn entry(&self, id: &Uuid) -> Result<Option<QueueEntry>, DatabaseError>;
    fn list_entries(&self, filter: &QueueFilter) -> Result<Vec<QueueEntry>, DatabaseError>;

    /// Compare-and-swap write: persists the entry's mutable fields only
    /// if the stored status still equals `expected`. Returns false when
    /// a concurrent writer changed the row first.
    fn update_entry_if_status(
        &self,
        entry: &QueueEntry,
        expected: QueueStatus,
    ) -> Result<bool, DatabaseError>;

    /// Attach the visit record created after the entry was persisted.
    /// Not a state transition, so no status guard.
    fn set_entry_encounter(&self, id: &Uuid, encounter_id: &Uuid) -> Result<(), DatabaseError>;

    fn max_sequence_number(
        &self,
        facility_id: &Uuid,
        service_point: ServicePoint,
        queue_date: &NaiveDate,
    ) -> Result<i64, DatabaseError>;

    fn count_waiting(
        &self,
        facility_id: &Uuid,
        service_point: ServicePoint,
        queue_date: &NaiveDate,
    ) -> Result<i64, DatabaseError>;

    fn open_entries_for_patient(
        &self,
        patient_id: &Uuid,
        facility_id: &Uuid,
        queue_date: &NaiveDate,
    ) -> Result<Vec<QueueEntry>, DatabaseError>;

    fn board_entries(
        &self,
        facility_id: &Uuid,
        queue_date: &NaiveDate,
        service_points: &[ServicePoint],
        limit: i64,
    ) -> Result<Vec<QueueEntry>, DatabaseError>;

    fn insert_display(&self, display: &QueueDisplay) -> Result<(), DatabaseError>;
    fn update_display(&self, display: &QueueDisplay) -> Result<(), DatabaseError>;
    fn display_by_code(&self, code: &str) -> Result<Option<QueueDisplay>, DatabaseError>;
    fn list_displays(&self, filter: &DisplayFilter) -> Result<Vec<QueueDisplay>, DatabaseError>;
}

/// SQLite-backed store. One connection guarded by a mutex; SQLite does
/// its own file locking underneath for multi-process setups.
pub struct SqliteQueueStore {
    conn: Mutex<Connection>,
}

impl SqliteQueueStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(open_database(path)?))
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(open_memory_database()?))
    }

    /// A poisoned lock only means another thread panicked mid-query;
    /// the connection itself is still usable.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl QueueStore for SqliteQueueStore {
    fn insert_entry(&self, entry: &QueueEntry) -> Result<(), DatabaseError> {
        repository::insert_queue_entry(&self.lock(), entry)
    }

    fn entry(&self, id: &Uuid) -> Result<Option<QueueEntry>, DatabaseError> {
        repository::get_queue_entry(&self.lock(), id)
    }

    fn list_entries(&self, filter: &QueueFilter) -> Result<Vec<QueueEntry>, DatabaseError> {
        repository::list_queue_entries(&self.lock(), filter)
    }

    fn update_entry_if_status(
        &self,
        entry: &QueueEntry,
        expected: QueueStatus,
    ) -> Result<bool, DatabaseError> {
        repository::update_queue_entry_if_status(&self.lock(), entry, expected)
    }

    fn set_entry_encounter(&self, id: &Uuid, encounter_id: &Uuid) -> Result<(), DatabaseError> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE queue_entries SET encounter_id = ?1 WHERE id = ?2",
            rusqlite::params![encounter_id.to_string(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity_type: "queue_entry".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn max_sequence_number(
        &self,
        facility_id: &Uuid,
        service_point: ServicePoint,
        queue_date: &NaiveDate,
    ) -> Result<i64, DatabaseError> {
        repository::max_sequence_number(&self.lock(), facility_id, service_point, queue_date)
    }

    fn count_waiting(
        &self,
        facility_id: &Uuid,
        service_point: ServicePoint,
        queue_date: &NaiveDate,
    ) -> Result<i64, DatabaseError> {
        repository::count_waiting(&self.lock(), facility_id, service_point, queue_date)
    }

    fn open_entries_for_patient(
        &self,
        patient_id: &Uuid,
        facility_id: &Uuid,
        queue_date: &NaiveDate,
    ) -> Result<Vec<QueueEntry>, DatabaseError> {
        repository::find_open_entries_for_patient(&self.lock(), patient_id, facility_id, queue_date)
    }

    fn board_entries(
        &self,
        facility_id: &Uuid,
        queue_date: &NaiveDate,
        service_points: &[ServicePoint],
        limit: i64,
    ) -> Result<Vec<QueueEntry>, DatabaseError> {
        repository::list_board_entries(&self.lock(), facility_id, queue_date, service_points, limit)
    }

    fn insert_display(&self, display: &QueueDisplay) -> Result<(), DatabaseError> {
        repository::insert_queue_display(&self.lock(), display)
    }

    fn update_display(&self, display: &QueueDisplay) -> Result<(), DatabaseError> {
        repository::update_queue_display(&self.lock(), display)
    }

    fn display_by_code(&self, code: &str) -> Result<Option<QueueDisplay>, DatabaseError> {
        repository::get_display_by_code(&self.lock(), code)
    }

    fn list_displays(&self, filter: &DisplayFilter) -> Result<Vec<QueueDisplay>, DatabaseError> {
        repository::list_queue_displays(&self.lock(), filter)
    }
}

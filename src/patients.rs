use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::patient::PatientSummary;
use crate::queue::SqliteQueueStore;

/// Narrow read interface onto the patient subsystem. The dispatcher only
/// ever needs enough of the record to validate and display.
pub trait PatientDirectory: Send + Sync {
    fn get_summary(&self, patient_id: &Uuid) -> Result<Option<PatientSummary>, DatabaseError>;
}

impl PatientDirectory for SqliteQueueStore {
    fn get_summary(&self, patient_id: &Uuid) -> Result<Option<PatientSummary>, DatabaseError> {
        repository::get_patient(&self.lock(), patient_id)
    }
}

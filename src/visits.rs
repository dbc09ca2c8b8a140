use chrono::Local;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::visit::VisitRecord;
use crate::queue::SqliteQueueStore;

/// Creates the lightweight visit record that accompanies every new
/// queue entry. The clinical encounter proper is owned by the encounter
/// subsystem; the dispatcher only keeps the id.
pub trait VisitRecordCreator: Send + Sync {
    fn create_visit(
        &self,
        patient_id: &Uuid,
        facility_id: &Uuid,
        actor_id: &Uuid,
        chief_complaint: Option<&str>,
        queue_number: &str,
    ) -> Result<Uuid, DatabaseError>;
}

impl VisitRecordCreator for SqliteQueueStore {
    fn create_visit(
        &self,
        patient_id: &Uuid,
        facility_id: &Uuid,
        actor_id: &Uuid,
        chief_complaint: Option<&str>,
        queue_number: &str,
    ) -> Result<Uuid, DatabaseError> {
        let now = Local::now().naive_local();
        let visit = VisitRecord {
            id: Uuid::new_v4(),
            patient_id: *patient_id,
            facility_id: *facility_id,
            visit_date: now.date(),
            chief_complaint: chief_complaint.map(str::to_owned),
            queue_number: Some(queue_number.to_owned()),
            created_by_id: *actor_id,
            created_at: now,
        };
        repository::insert_visit(&self.lock(), &visit)?;
        Ok(visit.id)
    }
}

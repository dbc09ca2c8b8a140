use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use uuid::Uuid;

use super::store::QueueStore;
use super::QueueError;
use crate::models::enums::ServicePoint;

type PartitionKey = (Uuid, ServicePoint, NaiveDate);

/// Hands out ticket and sequence numbers per (facility, service point,
/// day) partition. Sequence numbers are 1 + the partition's current
/// maximum; the ticket ordinal is the same number, zero-padded behind
/// the service point's letter.
///
/// Allocation and the insert that consumes it run under a per-partition
/// mutex, so two concurrent creations cannot read the same maximum. The
/// schema's unique indexes back this up for writers outside this
/// process; callers retry on a uniqueness violation.
pub struct SequenceAllocator {
    store: Arc<dyn QueueStore>,
    partitions: Mutex<HashMap<PartitionKey, Arc<Mutex<()>>>>,
}

impl SequenceAllocator {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            partitions: Mutex::new(HashMap::new()),
        }
    }

    fn partition_lock(&self, key: PartitionKey) -> Arc<Mutex<()>> {
        let mut partitions = self.partitions.lock().unwrap_or_else(|e| e.into_inner());
        partitions.entry(key).or_default().clone()
    }

    /// Next (ticket number, sequence number) for the partition.
    ///
    /// Only useful for inspection; creation paths go through
    /// [`with_next_ticket`](Self::with_next_ticket) so the consuming
    /// insert happens under the partition lock.
    pub fn next_ticket(
        &self,
        facility_id: &Uuid,
        service_point: ServicePoint,
        queue_date: &NaiveDate,
    ) -> Result<(String, i64), QueueError> {
        self.with_next_ticket(facility_id, service_point, queue_date, |ticket, sequence| {
            Ok((ticket, sequence))
        })
    }

    /// Compute the next ticket for the partition and run `body` with it
    /// before releasing the partition lock. `body` is expected to
    /// persist the entry that consumes the number.
    pub fn with_next_ticket<T>(
        &self,
        facility_id: &Uuid,
        service_point: ServicePoint,
        queue_date: &NaiveDate,
        body: impl FnOnce(String, i64) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let lock = self.partition_lock((*facility_id, service_point, *queue_date));
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let sequence = self
            .store
            .max_sequence_number(facility_id, service_point, queue_date)?
            + 1;
        let ticket = format!("{}{:03}", service_point.ticket_prefix(), sequence);
        body(ticket, sequence)
    }

    /// Sequence-only allocation, used when a skipped or no-show entry
    /// goes back to the end of the line keeping its ticket.
    pub fn with_next_sequence<T>(
        &self,
        facility_id: &Uuid,
        service_point: ServicePoint,
        queue_date: &NaiveDate,
        body: impl FnOnce(i64) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let lock = self.partition_lock((*facility_id, service_point, *queue_date));
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let sequence = self
            .store
            .max_sequence_number(facility_id, service_point, queue_date)?
            + 1;
        body(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_patient;
    use crate::models::enums::{Priority, QueueStatus};
    use crate::models::queue_entry::QueueEntry;
    use crate::models::PatientSummary;
    use crate::queue::SqliteQueueStore;
    use chrono::Local;

    fn seed_patient(store: &SqliteQueueStore) -> Uuid {
        let patient = PatientSummary {
            id: Uuid::new_v4(),
            medical_record_number: format!("MRN-{}", Uuid::new_v4()),
            full_name: "Test Patient".into(),
            phone: None,
        };
        insert_patient(&store.lock(), &patient).unwrap();
        patient.id
    }

    fn make_entry(
        facility_id: Uuid,
        service_point: ServicePoint,
        patient_id: Uuid,
        ticket: String,
        sequence: i64,
    ) -> QueueEntry {
        let now = Local::now().naive_local();
        QueueEntry {
            id: Uuid::new_v4(),
            ticket_number: ticket,
            queue_date: now.date(),
            service_point,
            status: QueueStatus::Waiting,
            priority: Priority::Normal,
            sequence_number: sequence,
            created_at: now,
            called_at: None,
            service_started_at: None,
            service_ended_at: None,
            estimated_wait_minutes: 0,
            actual_wait_minutes: None,
            service_duration_minutes: None,
            call_count: 0,
            room_number: None,
            notes: None,
            patient_id,
            encounter_id: None,
            facility_id,
            department_id: None,
            serving_user_id: None,
            created_by_id: Uuid::new_v4(),
            previous_queue_id: None,
            next_service_point: None,
            transfer_reason: None,
            skip_reason: None,
        }
    }

    #[test]
    fn sequences_start_at_one_and_stay_contiguous() {
        let store = Arc::new(SqliteQueueStore::in_memory().unwrap());
        let allocator = SequenceAllocator::new(store.clone());
        let facility = Uuid::new_v4();
        let today = Local::now().naive_local().date();

        for expected in 1..=4 {
            let patient = seed_patient(&store);
            let sequence = allocator
                .with_next_ticket(&facility, ServicePoint::Triage, &today, |ticket, seq| {
                    let entry =
                        make_entry(facility, ServicePoint::Triage, patient, ticket, seq);
                    store.insert_entry(&entry)?;
                    Ok(seq)
                })
                .unwrap();
            assert_eq!(sequence, expected);
        }
    }

    #[test]
    fn ticket_format_uses_prefix_and_padding() {
        let store = Arc::new(SqliteQueueStore::in_memory().unwrap());
        let allocator = SequenceAllocator::new(store.clone());
        let facility = Uuid::new_v4();
        let today = Local::now().naive_local().date();

        let (ticket, seq) = allocator
            .next_ticket(&facility, ServicePoint::Registration, &today)
            .unwrap();
        assert_eq!(ticket, "R001");
        assert_eq!(seq, 1);

        // Unmapped service points fall back to the generic prefix.
        let (ticket, _) = allocator
            .next_ticket(&facility, ServicePoint::Cashier, &today)
            .unwrap();
        assert_eq!(ticket, "Q001");
    }

    #[test]
    fn partitions_are_independent() {
        let store = Arc::new(SqliteQueueStore::in_memory().unwrap());
        let allocator = SequenceAllocator::new(store.clone());
        let facility = Uuid::new_v4();
        let today = Local::now().naive_local().date();

        let patient = seed_patient(&store);
        allocator
            .with_next_ticket(&facility, ServicePoint::Triage, &today, |ticket, seq| {
                let entry = make_entry(facility, ServicePoint::Triage, patient, ticket, seq);
                store.insert_entry(&entry)?;
                Ok(())
            })
            .unwrap();

        // The laboratory partition has not seen the triage allocation.
        let (ticket, seq) = allocator
            .next_ticket(&facility, ServicePoint::Laboratory, &today)
            .unwrap();
        assert_eq!(ticket, "L001");
        assert_eq!(seq, 1);
    }

    #[test]
    fn concurrent_allocations_never_collide() {
        let store = Arc::new(SqliteQueueStore::in_memory().unwrap());
        let allocator = Arc::new(SequenceAllocator::new(
            store.clone() as Arc<dyn QueueStore>
        ));
        let facility = Uuid::new_v4();
        let today = Local::now().naive_local().date();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let allocator = allocator.clone();
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..10 {
                    let patient = seed_patient(&store);
                    allocator
                        .with_next_ticket(
                            &facility,
                            ServicePoint::Pharmacy,
                            &today,
                            |ticket, seq| {
                                let entry = make_entry(
                                    facility,
                                    ServicePoint::Pharmacy,
                                    patient,
                                    ticket,
                                    seq,
                                );
                                store.insert_entry(&entry)?;
                                Ok(())
                            },
                        )
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // 40 inserts, sequence numbers 1..=40 with no gaps or repeats.
        let max = store
            .max_sequence_number(&facility, ServicePoint::Pharmacy, &today)
            .unwrap();
        assert_eq!(max, 40);

        let filter = crate::models::QueueFilter {
            facility_id: Some(facility),
            service_point: Some(ServicePoint::Pharmacy),
            ..Default::default()
        };
        let entries = store.list_entries(&filter).unwrap();
        let mut sequences: Vec<i64> = entries.iter().map(|e| e.sequence_number).collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=40).collect::<Vec<i64>>());
    }
}

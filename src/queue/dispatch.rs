use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::sequence::SequenceAllocator;
use super::store::QueueStore;
use super::QueueError;
use crate::config;
use crate::models::enums::{Priority, QueueStatus, ServicePoint};
use crate::models::filters::QueueFilter;
use crate::models::patient::PatientSummary;
use crate::models::queue_entry::QueueEntry;
use crate::patients::PatientDirectory;
use crate::staffing::StaffDutyLookup;
use crate::visits::VisitRecordCreator;

/// Request to add a patient to a service-point queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQueueEntry {
    pub patient_id: Uuid,
    pub facility_id: Uuid,
    pub service_point: ServicePoint,
    pub priority: Option<Priority>,
    pub department_id: Option<Uuid>,
    pub chief_complaint: Option<String>,
    pub notes: Option<String>,
    pub created_by_id: Uuid,
}

/// A freshly created entry hydrated with the patient and visit it
/// belongs to, ready for printing or display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTicket {
    pub entry: QueueEntry,
    pub patient: PatientSummary,
    pub visit_id: Option<Uuid>,
}

/// Filters for listing a day's queue. Date defaults to today.
#[derive(Debug, Clone, Default)]
pub struct QueueQuery {
    pub service_point: Option<ServicePoint>,
    pub status: Option<QueueStatus>,
    pub department_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

/// Orchestrates the queue lifecycle. Holds no cross-request state: the
/// waiting line is re-derived from the store on every selection, and
/// every write is conditioned on the status read just before it.
pub struct DispatchService {
    store: Arc<dyn QueueStore>,
    allocator: SequenceAllocator,
    patients: Arc<dyn PatientDirectory>,
    visits: Arc<dyn VisitRecordCreator>,
    duty: Arc<dyn StaffDutyLookup>,
}

impl DispatchService {
    pub fn new(
        store: Arc<dyn QueueStore>,
        patients: Arc<dyn PatientDirectory>,
        visits: Arc<dyn VisitRecordCreator>,
        duty: Arc<dyn StaffDutyLookup>,
    ) -> Self {
        let allocator = SequenceAllocator::new(store.clone());
        Self {
            store,
            allocator,
            patients,
            visits,
            duty,
        }
    }

    fn now() -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn fetch(&self, id: &Uuid) -> Result<QueueEntry, QueueError> {
        self.store.entry(id)?.ok_or_else(|| QueueError::NotFound {
            entity: "queue entry",
            id: id.to_string(),
        })
    }

    /// Conditional write keyed on the status read just before the
    /// mutation. Losing the race means another operator already moved
    /// the entry; report the transition against their status.
    fn commit(
        &self,
        entry: QueueEntry,
        expected: QueueStatus,
        operation: &'static str,
    ) -> Result<QueueEntry, QueueError> {
        if self.store.update_entry_if_status(&entry, expected)? {
            return Ok(entry);
        }
        warn!(
            "Concurrent update beat {operation} on ticket {}",
            entry.ticket_number
        );
        let current = self.fetch(&entry.id)?;
        Err(QueueError::InvalidTransition {
            operation,
            status: current.status,
        })
    }

    /// Admit a patient: allocate ticket and sequence, create the linked
    /// visit record, and persist the entry as waiting. Rejected when the
    /// patient already holds an open entry today at this facility.
    pub fn add_to_queue(&self, request: NewQueueEntry) -> Result<QueueTicket, QueueError> {
        let patient = self
            .patients
            .get_summary(&request.patient_id)?
            .ok_or_else(|| QueueError::NotFound {
                entity: "patient",
                id: request.patient_id.to_string(),
            })?;

        let now = Self::now();
        let today = now.date();

        let open = self.store.open_entries_for_patient(
            &request.patient_id,
            &request.facility_id,
            &today,
        )?;
        if let Some(existing) = open.first() {
            return Err(QueueError::AlreadyQueued {
                patient_id: request.patient_id,
                ticket_number: existing.ticket_number.clone(),
            });
        }

        let waiting =
            self.store
                .count_waiting(&request.facility_id, request.service_point, &today)?;
        let estimated_wait_minutes = waiting * config::ESTIMATED_MINUTES_PER_PATIENT;
        let priority = request.priority.unwrap_or_default();

        let mut attempts = 0;
        let entry = loop {
            attempts += 1;
            let result = self.allocator.with_next_ticket(
                &request.facility_id,
                request.service_point,
                &today,
                |ticket_number, sequence_number| {
                    let entry = QueueEntry {
                        id: Uuid::new_v4(),
                        ticket_number,
                        queue_date: today,
                        service_point: request.service_point,
                        status: QueueStatus::Waiting,
                        priority,
                        sequence_number,
                        created_at: now,
                        called_at: None,
                        service_started_at: None,
                        service_ended_at: None,
                        estimated_wait_minutes,
                        actual_wait_minutes: None,
                        service_duration_minutes: None,
                        call_count: 0,
                        room_number: None,
                        notes: request.notes.clone(),
                        patient_id: request.patient_id,
                        encounter_id: None,
                        facility_id: request.facility_id,
                        department_id: request.department_id,
                        serving_user_id: None,
                        created_by_id: request.created_by_id,
                        previous_queue_id: None,
                        next_service_point: None,
                        transfer_reason: None,
                        skip_reason: None,
                    };
                    self.store.insert_entry(&entry)?;
                    Ok(entry)
                },
            );
            match result {
                Ok(entry) => break entry,
                Err(QueueError::Storage(e))
                    if e.is_unique_violation() && attempts < config::ALLOCATION_RETRY_LIMIT =>
                {
                    warn!("Ticket allocation collided, retrying (attempt {attempts})");
                }
                Err(e) => return Err(e),
            }
        };

        let visit_id = self.visits.create_visit(
            &request.patient_id,
            &request.facility_id,
            &request.created_by_id,
            request.chief_complaint.as_deref(),
            &entry.ticket_number,
        )?;
        self.store.set_entry_encounter(&entry.id, &visit_id)?;
        let mut entry = entry;
        entry.encounter_id = Some(visit_id);

        info!(
            "Queued {} at {} with ticket {}",
            patient.medical_record_number,
            entry.service_point.as_str(),
            entry.ticket_number
        );
        Ok(QueueTicket {
            entry,
            patient,
            visit_id: Some(visit_id),
        })
    }

    /// Call the best waiting patient: lowest priority value first, then
    /// earliest sequence. Returns Ok(None) when nobody is waiting —
    /// that is a normal outcome, not an error. The selection is
    /// re-derived on every call, and the conditional write ensures two
    /// concurrent callers never both win the same entry.
    pub fn call_next(
        &self,
        facility_id: Uuid,
        service_point: ServicePoint,
        actor_id: Uuid,
        room_number: Option<String>,
    ) -> Result<Option<QueueEntry>, QueueError> {
        let now = Self::now();
        let today = now.date();
        let room = match room_number {
            Some(room) => Some(room),
            None => self.duty.room_number(&actor_id, &facility_id, &today)?,
        };

        loop {
            let filter = QueueFilter {
                facility_id: Some(facility_id),
                service_point: Some(service_point),
                status: Some(QueueStatus::Waiting),
                department_id: None,
                queue_date: Some(today),
            };
            let mut waiting = self.store.list_entries(&filter)?.into_iter();
            let Some(mut entry) = waiting.next() else {
                debug!("Nobody waiting at {}", service_point.as_str());
                return Ok(None);
            };

            entry.call(actor_id, room.clone(), now)?;
            if self.store.update_entry_if_status(&entry, QueueStatus::Waiting)? {
                info!("Called ticket {} (call #{})", entry.ticket_number, entry.call_count);
                return Ok(Some(entry));
            }
            // Another caller won this entry; select again.
        }
    }

    /// Call one particular waiting entry, out of turn.
    pub fn call_specific(
        &self,
        entry_id: &Uuid,
        actor_id: Uuid,
        room_number: Option<String>,
    ) -> Result<QueueEntry, QueueError> {
        let mut entry = self.fetch(entry_id)?;
        let room = match room_number {
            Some(room) => Some(room),
            None => self
                .duty
                .room_number(&actor_id, &entry.facility_id, &entry.queue_date)?,
        };
        entry.call(actor_id, room, Self::now())?;
        self.commit(entry, QueueStatus::Waiting, "call")
    }

    /// Announce a called patient again.
    pub fn recall(&self, entry_id: &Uuid) -> Result<QueueEntry, QueueError> {
        let mut entry = self.fetch(entry_id)?;
        entry.recall(Self::now())?;
        self.commit(entry, QueueStatus::Called, "recall")
    }

    pub fn start_service(&self, entry_id: &Uuid) -> Result<QueueEntry, QueueError> {
        let mut entry = self.fetch(entry_id)?;
        entry.start_service(Self::now())?;
        let entry = self.commit(entry, QueueStatus::Called, "start_service")?;
        info!(
            "Service started for ticket {} after {}min wait",
            entry.ticket_number,
            entry.actual_wait_minutes.unwrap_or(0)
        );
        Ok(entry)
    }

    pub fn complete_service(&self, entry_id: &Uuid) -> Result<QueueEntry, QueueError> {
        let mut entry = self.fetch(entry_id)?;
        entry.complete_service(Self::now())?;
        let entry = self.commit(entry, QueueStatus::InService, "complete_service")?;
        info!(
            "Completed ticket {} in {}min",
            entry.ticket_number,
            entry.service_duration_minutes.unwrap_or(0)
        );
        Ok(entry)
    }

    /// Pass over a patient who is not ready or not answering.
    pub fn skip(&self, entry_id: &Uuid, reason: Option<String>) -> Result<QueueEntry, QueueError> {
        let mut entry = self.fetch(entry_id)?;
        let previous = entry.status;
        entry.skip(reason)?;
        self.commit(entry, previous, "skip")
    }

    pub fn mark_no_show(&self, entry_id: &Uuid) -> Result<QueueEntry, QueueError> {
        let mut entry = self.fetch(entry_id)?;
        entry.mark_no_show()?;
        self.commit(entry, QueueStatus::Called, "mark_no_show")
    }

    pub fn cancel(&self, entry_id: &Uuid, reason: Option<String>) -> Result<QueueEntry, QueueError> {
        let mut entry = self.fetch(entry_id)?;
        let previous = entry.status;
        entry.cancel(reason)?;
        self.commit(entry, previous, "cancel")
    }

    /// Return a skipped or no-show patient to the end of the line. The
    /// entry keeps its id and ticket; only the sequence is reallocated.
    pub fn requeue(&self, entry_id: &Uuid) -> Result<QueueEntry, QueueError> {
        let mut entry = self.fetch(entry_id)?;
        let previous = entry.status;
        let facility_id = entry.facility_id;
        let service_point = entry.service_point;
        let queue_date = entry.queue_date;

        self.allocator.with_next_sequence(
            &facility_id,
            service_point,
            &queue_date,
            move |sequence| {
                entry.requeue(sequence)?;
                self.commit(entry, previous, "requeue")
            },
        )
    }

    /// End the patient's turn here and open a new one at another
    /// service point. Two halves, committed in order: finalize the
    /// source entry, then spawn the continuation linked back to it.
    pub fn transfer(
        &self,
        entry_id: &Uuid,
        next_service_point: ServicePoint,
        reason: Option<String>,
        actor_id: Uuid,
    ) -> Result<QueueTicket, QueueError> {
        let mut source = self.fetch(entry_id)?;
        let previous = source.status;
        source.finalize_transfer(next_service_point, reason, Self::now())?;
        let source = self.commit(source, previous, "transfer")?;

        let continuation = self.spawn_continuation(&source, actor_id)?;
        info!(
            "Transferred {} to {} as {}",
            source.ticket_number,
            next_service_point.as_str(),
            continuation.entry.ticket_number
        );
        Ok(continuation)
    }

    /// Second half of a transfer: create the destination entry carrying
    /// the patient, visit, priority and department forward.
    pub fn spawn_continuation(
        &self,
        source: &QueueEntry,
        actor_id: Uuid,
    ) -> Result<QueueTicket, QueueError> {
        let destination = source.next_service_point.ok_or(QueueError::Validation {
            reason: "source entry has no destination service point".into(),
        })?;
        let patient = self
            .patients
            .get_summary(&source.patient_id)?
            .ok_or_else(|| QueueError::NotFound {
                entity: "patient",
                id: source.patient_id.to_string(),
            })?;

        let now = Self::now();
        let today = now.date();
        let waiting = self
            .store
            .count_waiting(&source.facility_id, destination, &today)?;
        let estimated_wait_minutes = waiting * config::ESTIMATED_MINUTES_PER_PATIENT;

        let mut attempts = 0;
        let entry = loop {
            attempts += 1;
            let result = self.allocator.with_next_ticket(
                &source.facility_id,
                destination,
                &today,
                |ticket_number, sequence_number| {
                    let entry = QueueEntry {
                        id: Uuid::new_v4(),
                        ticket_number,
                        queue_date: today,
                        service_point: destination,
                        status: QueueStatus::Waiting,
                        priority: source.priority,
                        sequence_number,
                        created_at: now,
                        called_at: None,
                        service_started_at: None,
                        service_ended_at: None,
                        estimated_wait_minutes,
                        actual_wait_minutes: None,
                        service_duration_minutes: None,
                        call_count: 0,
                        room_number: None,
                        notes: None,
                        patient_id: source.patient_id,
                        encounter_id: source.encounter_id,
                        facility_id: source.facility_id,
                        department_id: source.department_id,
                        serving_user_id: None,
                        created_by_id: actor_id,
                        previous_queue_id: Some(source.id),
                        next_service_point: None,
                        transfer_reason: None,
                        skip_reason: None,
                    };
                    self.store.insert_entry(&entry)?;
                    Ok(entry)
                },
            );
            match result {
                Ok(entry) => break entry,
                Err(QueueError::Storage(e))
                    if e.is_unique_violation() && attempts < config::ALLOCATION_RETRY_LIMIT =>
                {
                    warn!("Ticket allocation collided, retrying (attempt {attempts})");
                }
                Err(e) => return Err(e),
            }
        };

        Ok(QueueTicket {
            visit_id: entry.encounter_id,
            entry,
            patient,
        })
    }

    /// A day's queue, ordered for service (priority, then arrival).
    pub fn get_queue(
        &self,
        facility_id: Uuid,
        query: &QueueQuery,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        let date = query.date.unwrap_or_else(|| Self::now().date());
        let filter = QueueFilter {
            facility_id: Some(facility_id),
            service_point: query.service_point,
            status: query.status,
            department_id: query.department_id,
            queue_date: Some(date),
        };
        Ok(self.store.list_entries(&filter)?)
    }

    /// The patient's open entries today, newest first.
    pub fn get_patient_open_entries(
        &self,
        patient_id: &Uuid,
        facility_id: &Uuid,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        let today = Self::now().date();
        Ok(self
            .store
            .open_entries_for_patient(patient_id, facility_id, &today)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{get_visit, insert_duty_assignment, insert_patient};
    use crate::models::duty::DutyAssignment;
    use crate::queue::SqliteQueueStore;
    use std::collections::HashSet;

    fn service() -> (DispatchService, Arc<SqliteQueueStore>) {
        let store = Arc::new(SqliteQueueStore::in_memory().unwrap());
        let dispatch = DispatchService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        (dispatch, store)
    }

    fn seed_patient(store: &SqliteQueueStore, name: &str) -> Uuid {
        let patient = PatientSummary {
            id: Uuid::new_v4(),
            medical_record_number: format!("MRN-{}", Uuid::new_v4()),
            full_name: name.into(),
            phone: None,
        };
        insert_patient(&store.lock(), &patient).unwrap();
        patient.id
    }

    fn request(
        patient_id: Uuid,
        facility_id: Uuid,
        service_point: ServicePoint,
        priority: Option<Priority>,
    ) -> NewQueueEntry {
        NewQueueEntry {
            patient_id,
            facility_id,
            service_point,
            priority,
            department_id: None,
            chief_complaint: Some("fever".into()),
            notes: None,
            created_by_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn add_creates_waiting_entry_with_linked_visit() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();
        let patient = seed_patient(&store, "Asha Mwangi");

        let ticket = dispatch
            .add_to_queue(request(patient, facility, ServicePoint::Consultation, None))
            .unwrap();

        assert_eq!(ticket.entry.ticket_number, "C001");
        assert_eq!(ticket.entry.sequence_number, 1);
        assert_eq!(ticket.entry.status, QueueStatus::Waiting);
        assert_eq!(ticket.entry.priority, Priority::Normal);
        assert_eq!(ticket.entry.estimated_wait_minutes, 0);
        assert_eq!(ticket.patient.full_name, "Asha Mwangi");

        let visit_id = ticket.visit_id.unwrap();
        assert_eq!(ticket.entry.encounter_id, Some(visit_id));
        let visit = get_visit(&store.lock(), &visit_id).unwrap().unwrap();
        assert_eq!(visit.patient_id, patient);
        assert_eq!(visit.queue_number.as_deref(), Some("C001"));
        assert_eq!(visit.chief_complaint.as_deref(), Some("fever"));

        // The persisted entry matches what was returned.
        let stored = store.entry(&ticket.entry.id).unwrap().unwrap();
        assert_eq!(stored.encounter_id, Some(visit_id));
    }

    #[test]
    fn unknown_patient_rejected() {
        let (dispatch, _store) = service();
        let err = dispatch
            .add_to_queue(request(
                Uuid::new_v4(),
                Uuid::new_v4(),
                ServicePoint::Triage,
                None,
            ))
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound { entity: "patient", .. }));
    }

    #[test]
    fn estimated_wait_scales_with_waiting_count() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();

        let first = seed_patient(&store, "First");
        dispatch
            .add_to_queue(request(first, facility, ServicePoint::Triage, None))
            .unwrap();

        let second = seed_patient(&store, "Second");
        let ticket = dispatch
            .add_to_queue(request(second, facility, ServicePoint::Triage, None))
            .unwrap();
        assert_eq!(ticket.entry.estimated_wait_minutes, 10);
        assert_eq!(ticket.entry.ticket_number, "T002");
    }

    #[test]
    fn duplicate_open_entry_rejected_with_existing_ticket() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();
        let patient = seed_patient(&store, "Juma");

        dispatch
            .add_to_queue(request(patient, facility, ServicePoint::Registration, None))
            .unwrap();
        let err = dispatch
            .add_to_queue(request(patient, facility, ServicePoint::Triage, None))
            .unwrap_err();
        match err {
            QueueError::AlreadyQueued { patient_id, ticket_number } => {
                assert_eq!(patient_id, patient);
                assert_eq!(ticket_number, "R001");
            }
            other => panic!("expected AlreadyQueued, got {other:?}"),
        }
    }

    #[test]
    fn completed_entry_does_not_block_new_one() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();
        let patient = seed_patient(&store, "Neema");

        let ticket = dispatch
            .add_to_queue(request(patient, facility, ServicePoint::Triage, None))
            .unwrap();
        dispatch
            .call_specific(&ticket.entry.id, Uuid::new_v4(), None)
            .unwrap();
        dispatch.start_service(&ticket.entry.id).unwrap();
        dispatch.complete_service(&ticket.entry.id).unwrap();

        // Same patient may queue again once the first entry is closed.
        dispatch
            .add_to_queue(request(patient, facility, ServicePoint::Pharmacy, None))
            .unwrap();
    }

    #[test]
    fn queue_orders_priority_before_arrival() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();

        let routine = seed_patient(&store, "Routine");
        let emergency = seed_patient(&store, "Emergency");
        let a = dispatch
            .add_to_queue(request(
                routine,
                facility,
                ServicePoint::Triage,
                Some(Priority::Routine),
            ))
            .unwrap();
        let b = dispatch
            .add_to_queue(request(
                emergency,
                facility,
                ServicePoint::Triage,
                Some(Priority::Emergency),
            ))
            .unwrap();

        let queue = dispatch
            .get_queue(facility, &QueueQuery::default())
            .unwrap();
        assert_eq!(queue.len(), 2);
        // B arrived later but outranks A.
        assert_eq!(queue[0].id, b.entry.id);
        assert_eq!(queue[1].id, a.entry.id);
    }

    #[test]
    fn call_next_picks_priority_then_fifo_and_fills_room() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let today = Local::now().naive_local().date();

        insert_duty_assignment(
            &store.lock(),
            &DutyAssignment {
                id: Uuid::new_v4(),
                staff_id: actor,
                facility_id: facility,
                duty_date: today,
                service_point: Some(ServicePoint::Consultation),
                room_number: Some("12".into()),
            },
        )
        .unwrap();

        let first = seed_patient(&store, "First Routine");
        let second = seed_patient(&store, "Second Routine");
        let urgent = seed_patient(&store, "Urgent");
        dispatch
            .add_to_queue(request(
                first,
                facility,
                ServicePoint::Consultation,
                Some(Priority::Routine),
            ))
            .unwrap();
        dispatch
            .add_to_queue(request(
                second,
                facility,
                ServicePoint::Consultation,
                Some(Priority::Routine),
            ))
            .unwrap();
        dispatch
            .add_to_queue(request(
                urgent,
                facility,
                ServicePoint::Consultation,
                Some(Priority::Urgent),
            ))
            .unwrap();

        let called = dispatch
            .call_next(facility, ServicePoint::Consultation, actor, None)
            .unwrap()
            .unwrap();
        assert_eq!(called.patient_id, urgent);
        assert_eq!(called.status, QueueStatus::Called);
        assert_eq!(called.call_count, 1);
        assert_eq!(called.serving_user_id, Some(actor));
        assert_eq!(called.room_number.as_deref(), Some("12"));

        let called = dispatch
            .call_next(facility, ServicePoint::Consultation, actor, None)
            .unwrap()
            .unwrap();
        assert_eq!(called.patient_id, first);

        let called = dispatch
            .call_next(facility, ServicePoint::Consultation, actor, None)
            .unwrap()
            .unwrap();
        assert_eq!(called.patient_id, second);

        // Nobody left: a normal empty result, not an error.
        assert!(dispatch
            .call_next(facility, ServicePoint::Consultation, actor, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn explicit_room_wins_over_duty_roster() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();
        let actor = Uuid::new_v4();

        let patient = seed_patient(&store, "Walk-in");
        dispatch
            .add_to_queue(request(patient, facility, ServicePoint::Vitals, None))
            .unwrap();
        let called = dispatch
            .call_next(facility, ServicePoint::Vitals, actor, Some("4B".into()))
            .unwrap()
            .unwrap();
        assert_eq!(called.room_number.as_deref(), Some("4B"));
    }

    #[test]
    fn start_service_straight_from_waiting_is_rejected() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();
        let patient = seed_patient(&store, "Eager");

        let ticket = dispatch
            .add_to_queue(request(patient, facility, ServicePoint::Triage, None))
            .unwrap();
        let err = dispatch.start_service(&ticket.entry.id).unwrap_err();
        match err {
            QueueError::InvalidTransition { operation, status } => {
                assert_eq!(operation, "start_service");
                assert_eq!(status, QueueStatus::Waiting);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        // The entry is untouched.
        let stored = store.entry(&ticket.entry.id).unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Waiting);
        assert!(stored.service_started_at.is_none());
    }

    #[test]
    fn recall_updates_call_count() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();
        let patient = seed_patient(&store, "Hard of hearing");

        let ticket = dispatch
            .add_to_queue(request(patient, facility, ServicePoint::Triage, None))
            .unwrap();
        dispatch
            .call_specific(&ticket.entry.id, Uuid::new_v4(), None)
            .unwrap();
        let recalled = dispatch.recall(&ticket.entry.id).unwrap();
        assert_eq!(recalled.call_count, 2);
        assert_eq!(recalled.status, QueueStatus::Called);
    }

    #[test]
    fn skip_then_requeue_moves_to_end_of_line() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();

        let absent = seed_patient(&store, "Absent");
        let present = seed_patient(&store, "Present");
        let first = dispatch
            .add_to_queue(request(absent, facility, ServicePoint::Laboratory, None))
            .unwrap();
        dispatch
            .add_to_queue(request(present, facility, ServicePoint::Laboratory, None))
            .unwrap();

        let skipped = dispatch
            .skip(&first.entry.id, Some("stepped out".into()))
            .unwrap();
        assert_eq!(skipped.status, QueueStatus::Skipped);

        let requeued = dispatch.requeue(&first.entry.id).unwrap();
        assert_eq!(requeued.id, first.entry.id);
        assert_eq!(requeued.status, QueueStatus::Waiting);
        assert_eq!(requeued.ticket_number, first.entry.ticket_number);
        assert!(requeued.sequence_number > first.entry.sequence_number);
        assert!(requeued.called_at.is_none());
        assert!(requeued.skip_reason.is_none());

        // The requeued patient now waits behind the other one.
        let called = dispatch
            .call_next(facility, ServicePoint::Laboratory, Uuid::new_v4(), None)
            .unwrap()
            .unwrap();
        assert_eq!(called.patient_id, present);
    }

    #[test]
    fn no_show_then_requeue() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();
        let patient = seed_patient(&store, "Missing");

        let ticket = dispatch
            .add_to_queue(request(patient, facility, ServicePoint::Triage, None))
            .unwrap();
        dispatch
            .call_specific(&ticket.entry.id, Uuid::new_v4(), None)
            .unwrap();
        let marked = dispatch.mark_no_show(&ticket.entry.id).unwrap();
        assert_eq!(marked.status, QueueStatus::NoShow);

        let requeued = dispatch.requeue(&ticket.entry.id).unwrap();
        assert_eq!(requeued.status, QueueStatus::Waiting);
        assert_eq!(requeued.sequence_number, 2);
    }

    #[test]
    fn cancel_blocked_while_in_service() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();
        let patient = seed_patient(&store, "Mid-consult");

        let ticket = dispatch
            .add_to_queue(request(patient, facility, ServicePoint::Consultation, None))
            .unwrap();
        dispatch
            .call_specific(&ticket.entry.id, Uuid::new_v4(), None)
            .unwrap();
        dispatch.start_service(&ticket.entry.id).unwrap();

        let err = dispatch
            .cancel(&ticket.entry.id, Some("changed mind".into()))
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { .. }));
    }

    #[test]
    fn cancel_waiting_entry_records_reason() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();
        let patient = seed_patient(&store, "Leaving");

        let ticket = dispatch
            .add_to_queue(request(patient, facility, ServicePoint::Billing, None))
            .unwrap();
        let cancelled = dispatch
            .cancel(&ticket.entry.id, Some("went home".into()))
            .unwrap();
        assert_eq!(cancelled.status, QueueStatus::Cancelled);
        assert_eq!(cancelled.skip_reason.as_deref(), Some("went home"));
    }

    #[test]
    fn transfer_finalizes_source_and_spawns_linked_continuation() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let patient = seed_patient(&store, "Referred");

        let source = dispatch
            .add_to_queue(request(
                patient,
                facility,
                ServicePoint::Registration,
                Some(Priority::High),
            ))
            .unwrap();
        dispatch
            .call_specific(&source.entry.id, actor, None)
            .unwrap();
        dispatch.start_service(&source.entry.id).unwrap();

        let continuation = dispatch
            .transfer(
                &source.entry.id,
                ServicePoint::Triage,
                Some("needs triage".into()),
                actor,
            )
            .unwrap();

        let finalized = store.entry(&source.entry.id).unwrap().unwrap();
        assert_eq!(finalized.status, QueueStatus::Transferred);
        assert_eq!(finalized.next_service_point, Some(ServicePoint::Triage));
        assert_eq!(finalized.transfer_reason.as_deref(), Some("needs triage"));
        assert!(finalized.service_duration_minutes.is_some());

        assert_eq!(continuation.entry.service_point, ServicePoint::Triage);
        assert_eq!(continuation.entry.status, QueueStatus::Waiting);
        assert_eq!(continuation.entry.previous_queue_id, Some(source.entry.id));
        assert_eq!(continuation.entry.priority, Priority::High);
        assert_eq!(continuation.entry.patient_id, patient);
        assert_eq!(continuation.entry.encounter_id, source.entry.encounter_id);
        assert_eq!(continuation.entry.ticket_number, "T001");

        // Exactly one continuation references the source.
        let queue = dispatch
            .get_queue(
                facility,
                &QueueQuery {
                    service_point: Some(ServicePoint::Triage),
                    ..Default::default()
                },
            )
            .unwrap();
        let linked: Vec<_> = queue
            .iter()
            .filter(|e| e.previous_queue_id == Some(source.entry.id))
            .collect();
        assert_eq!(linked.len(), 1);
    }

    #[test]
    fn open_entries_excludes_closed_ones() {
        let (dispatch, store) = service();
        let facility = Uuid::new_v4();
        let patient = seed_patient(&store, "Busy");

        let ticket = dispatch
            .add_to_queue(request(patient, facility, ServicePoint::Triage, None))
            .unwrap();
        let open = dispatch
            .get_patient_open_entries(&patient, &facility)
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, ticket.entry.id);

        dispatch.cancel(&ticket.entry.id, None).unwrap();
        let open = dispatch
            .get_patient_open_entries(&patient, &facility)
            .unwrap();
        assert!(open.is_empty());
    }

    #[test]
    fn missing_entry_is_not_found() {
        let (dispatch, _store) = service();
        let err = dispatch.recall(&Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, QueueError::NotFound { entity: "queue entry", .. }));
    }

    #[test]
    fn concurrent_call_next_never_double_calls() {
        let (dispatch, store) = service();
        let dispatch = Arc::new(dispatch);
        let facility = Uuid::new_v4();

        for i in 0..6 {
            let patient = seed_patient(&store, &format!("Patient {i}"));
            dispatch
                .add_to_queue(request(patient, facility, ServicePoint::Pharmacy, None))
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..3 {
            let dispatch = dispatch.clone();
            handles.push(std::thread::spawn(move || {
                let actor = Uuid::new_v4();
                let mut called = Vec::new();
                while let Some(entry) = dispatch
                    .call_next(facility, ServicePoint::Pharmacy, actor, None)
                    .unwrap()
                {
                    called.push(entry.id);
                }
                called
            }));
        }

        let mut all: Vec<Uuid> = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        let distinct: HashSet<Uuid> = all.iter().copied().collect();
        assert_eq!(all.len(), 6, "every waiting patient called exactly once");
        assert_eq!(distinct.len(), 6, "no patient called twice");
    }
}

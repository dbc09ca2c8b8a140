use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Priority, QueueStatus, ServicePoint};
use crate::queue::QueueError;

/// One ticket for one patient at one service point on one calendar day.
///
/// Every status change goes through the transition methods below; each
/// validates the current status before mutating and rejects anything
/// else with `QueueError::InvalidTransition`. The matches are exhaustive
/// on purpose — a new status variant must be wired into every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub ticket_number: String,
    pub queue_date: NaiveDate,
    pub service_point: ServicePoint,
    pub status: QueueStatus,
    pub priority: Priority,
    pub sequence_number: i64,
    pub created_at: NaiveDateTime,
    pub called_at: Option<NaiveDateTime>,
    pub service_started_at: Option<NaiveDateTime>,
    pub service_ended_at: Option<NaiveDateTime>,
    pub estimated_wait_minutes: i64,
    pub actual_wait_minutes: Option<i64>,
    pub service_duration_minutes: Option<i64>,
    pub call_count: i64,
    pub room_number: Option<String>,
    pub notes: Option<String>,
    pub patient_id: Uuid,
    pub encounter_id: Option<Uuid>,
    pub facility_id: Uuid,
    pub department_id: Option<Uuid>,
    pub serving_user_id: Option<Uuid>,
    pub created_by_id: Uuid,
    pub previous_queue_id: Option<Uuid>,
    pub next_service_point: Option<ServicePoint>,
    pub transfer_reason: Option<String>,
    pub skip_reason: Option<String>,
}

/// Whole minutes between two instants, rounded half-up.
pub fn minutes_between(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    let secs = (to - from).num_seconds().max(0);
    (secs + 30) / 60
}

impl QueueEntry {
    fn rejected(&self, operation: &'static str) -> QueueError {
        QueueError::InvalidTransition {
            operation,
            status: self.status,
        }
    }

    /// Mark the entry as called by a staff member. The room number is
    /// only overwritten when one is supplied.
    pub fn call(
        &mut self,
        serving_user_id: Uuid,
        room_number: Option<String>,
        now: NaiveDateTime,
    ) -> Result<(), QueueError> {
        match self.status {
            QueueStatus::Waiting => {
                self.status = QueueStatus::Called;
                self.called_at = Some(now);
                self.call_count += 1;
                self.serving_user_id = Some(serving_user_id);
                if room_number.is_some() {
                    self.room_number = room_number;
                }
                Ok(())
            }
            QueueStatus::Called
            | QueueStatus::InService
            | QueueStatus::Completed
            | QueueStatus::Skipped
            | QueueStatus::NoShow
            | QueueStatus::Transferred
            | QueueStatus::Cancelled => Err(self.rejected("call")),
        }
    }

    /// Call the patient again without changing status.
    pub fn recall(&mut self, now: NaiveDateTime) -> Result<(), QueueError> {
        match self.status {
            QueueStatus::Called => {
                self.called_at = Some(now);
                self.call_count += 1;
                Ok(())
            }
            QueueStatus::Waiting
            | QueueStatus::InService
            | QueueStatus::Completed
            | QueueStatus::Skipped
            | QueueStatus::NoShow
            | QueueStatus::Transferred
            | QueueStatus::Cancelled => Err(self.rejected("recall")),
        }
    }

    pub fn start_service(&mut self, now: NaiveDateTime) -> Result<(), QueueError> {
        match self.status {
            QueueStatus::Called => {
                self.status = QueueStatus::InService;
                self.service_started_at = Some(now);
                self.actual_wait_minutes = Some(minutes_between(self.created_at, now));
                Ok(())
            }
            QueueStatus::Waiting
            | QueueStatus::InService
            | QueueStatus::Completed
            | QueueStatus::Skipped
            | QueueStatus::NoShow
            | QueueStatus::Transferred
            | QueueStatus::Cancelled => Err(self.rejected("start_service")),
        }
    }

    pub fn complete_service(&mut self, now: NaiveDateTime) -> Result<(), QueueError> {
        match self.status {
            QueueStatus::InService => {
                self.status = QueueStatus::Completed;
                self.service_ended_at = Some(now);
                if let Some(started) = self.service_started_at {
                    self.service_duration_minutes = Some(minutes_between(started, now));
                }
                Ok(())
            }
            QueueStatus::Waiting
            | QueueStatus::Called
            | QueueStatus::Completed
            | QueueStatus::Skipped
            | QueueStatus::NoShow
            | QueueStatus::Transferred
            | QueueStatus::Cancelled => Err(self.rejected("complete_service")),
        }
    }

    /// First half of a transfer: finalize this entry. The continuation
    /// entry at the destination is created by the dispatcher. Allowed
    /// from any status; in practice entries are transferred while in
    /// service.
    pub fn finalize_transfer(
        &mut self,
        next_service_point: ServicePoint,
        reason: Option<String>,
        now: NaiveDateTime,
    ) -> Result<(), QueueError> {
        self.status = QueueStatus::Transferred;
        self.service_ended_at = Some(now);
        self.next_service_point = Some(next_service_point);
        self.transfer_reason = reason;
        // Duration only makes sense once service actually started.
        if let Some(started) = self.service_started_at {
            self.service_duration_minutes = Some(minutes_between(started, now));
        }
        Ok(())
    }

    pub fn skip(&mut self, reason: Option<String>) -> Result<(), QueueError> {
        match self.status {
            QueueStatus::Waiting | QueueStatus::Called => {
                self.status = QueueStatus::Skipped;
                self.skip_reason = reason;
                Ok(())
            }
            QueueStatus::InService
            | QueueStatus::Completed
            | QueueStatus::Skipped
            | QueueStatus::NoShow
            | QueueStatus::Transferred
            | QueueStatus::Cancelled => Err(self.rejected("skip")),
        }
    }

    pub fn mark_no_show(&mut self) -> Result<(), QueueError> {
        match self.status {
            QueueStatus::Called => {
                self.status = QueueStatus::NoShow;
                Ok(())
            }
            QueueStatus::Waiting
            | QueueStatus::InService
            | QueueStatus::Completed
            | QueueStatus::Skipped
            | QueueStatus::NoShow
            | QueueStatus::Transferred
            | QueueStatus::Cancelled => Err(self.rejected("mark_no_show")),
        }
    }

    /// Cancellation is allowed from every state except an active or
    /// finished service. The reason shares the skip_reason column.
    pub fn cancel(&mut self, reason: Option<String>) -> Result<(), QueueError> {
        match self.status {
            QueueStatus::Waiting
            | QueueStatus::Called
            | QueueStatus::Skipped
            | QueueStatus::NoShow
            | QueueStatus::Transferred
            | QueueStatus::Cancelled => {
                self.status = QueueStatus::Cancelled;
                self.skip_reason = reason;
                Ok(())
            }
            QueueStatus::InService | QueueStatus::Completed => Err(self.rejected("cancel")),
        }
    }

    /// Put a skipped or no-show patient back at the end of the line.
    /// The entry keeps its identity and ticket; only the sequence moves.
    pub fn requeue(&mut self, new_sequence_number: i64) -> Result<(), QueueError> {
        match self.status {
            QueueStatus::Skipped | QueueStatus::NoShow => {
                self.status = QueueStatus::Waiting;
                self.sequence_number = new_sequence_number;
                self.called_at = None;
                self.skip_reason = None;
                self.serving_user_id = None;
                Ok(())
            }
            QueueStatus::Waiting
            | QueueStatus::Called
            | QueueStatus::InService
            | QueueStatus::Completed
            | QueueStatus::Transferred
            | QueueStatus::Cancelled => Err(self.rejected("requeue")),
        }
    }
}

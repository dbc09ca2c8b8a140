use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::store::QueueStore;
use super::QueueError;
use crate::db::DatabaseError;
use crate::models::enums::{QueueStatus, ServicePoint};
use crate::models::filters::DisplayFilter;
use crate::models::queue_display::{DisplaySettings, QueueDisplay};
use crate::patients::PatientDirectory;

/// Administrator request to register a display board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDisplay {
    pub display_code: String,
    pub display_name: String,
    pub facility_id: Uuid,
    pub service_points: Vec<ServicePoint>,
    pub settings: Option<DisplaySettings>,
}

/// One line on a waiting-room board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardEntry {
    pub ticket_number: String,
    pub service_point: ServicePoint,
    pub service_point_label: String,
    pub status: QueueStatus,
    pub room_number: Option<String>,
    pub patient_name: Option<String>,
    pub called_at: Option<NaiveDateTime>,
}

/// Everything a board needs to render one refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayBoard {
    pub display_code: String,
    pub display_name: String,
    pub refresh_seconds: i64,
    pub announcement: Option<String>,
    pub entries: Vec<BoardEntry>,
}

/// Read-only projection for public displays, plus the administration
/// operations that configure them.
pub struct DisplayFeed {
    store: Arc<dyn QueueStore>,
    patients: Arc<dyn PatientDirectory>,
}

impl DisplayFeed {
    pub fn new(store: Arc<dyn QueueStore>, patients: Arc<dyn PatientDirectory>) -> Self {
        Self { store, patients }
    }

    /// Current board content for a named display: called and in-service
    /// entries at the display's service points, most recently called
    /// first, truncated to the configured size. Inactive or unknown
    /// displays are both reported as not found.
    pub fn get_display_queue(&self, display_code: &str) -> Result<DisplayBoard, QueueError> {
        let display = self
            .store
            .display_by_code(display_code)?
            .filter(|d| d.is_active)
            .ok_or_else(|| QueueError::NotFound {
                entity: "display",
                id: display_code.to_string(),
            })?;

        let today = Local::now().naive_local().date();
        let entries = self.store.board_entries(
            &display.facility_id,
            &today,
            &display.service_points,
            display.settings.max_display,
        )?;

        let mut board_entries = Vec::with_capacity(entries.len());
        for entry in entries {
            let patient_name = if display.settings.show_patient_names {
                self.patients
                    .get_summary(&entry.patient_id)?
                    .map(|p| p.full_name)
            } else {
                None
            };
            board_entries.push(BoardEntry {
                ticket_number: entry.ticket_number,
                service_point: entry.service_point,
                service_point_label: entry.service_point.label().to_string(),
                status: entry.status,
                room_number: if display.settings.show_room_numbers {
                    entry.room_number
                } else {
                    None
                },
                patient_name,
                called_at: entry.called_at,
            });
        }

        Ok(DisplayBoard {
            display_code: display.display_code,
            display_name: display.display_name,
            refresh_seconds: display.settings.refresh_seconds,
            announcement: display.settings.announcement,
            entries: board_entries,
        })
    }

    pub fn create_display(&self, request: NewDisplay) -> Result<QueueDisplay, QueueError> {
        if request.service_points.is_empty() {
            return Err(QueueError::Validation {
                reason: "a display must cover at least one service point".into(),
            });
        }
        let now = Local::now().naive_local();
        let display = QueueDisplay {
            id: Uuid::new_v4(),
            display_code: request.display_code,
            display_name: request.display_name,
            facility_id: request.facility_id,
            service_points: request.service_points,
            is_active: true,
            settings: request.settings.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        match self.store.insert_display(&display) {
            Ok(()) => {
                let display_code = &display.display_code;
                info!("Registered display {}", display_code);
                Ok(display)
            }
            Err(e) if e.is_unique_violation() => Err(QueueError::Validation {
                reason: format!("display code {} already exists", display.display_code),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_display(&self, display: &QueueDisplay) -> Result<(), QueueError> {
        let mut updated = display.clone();
        updated.updated_at = Local::now().naive_local();
        match self.store.update_display(&updated) {
            Ok(()) => Ok(()),
            Err(DatabaseError::NotFound { id, .. }) => Err(QueueError::NotFound {
                entity: "display",
                id,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_displays(
        &self,
        facility_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<QueueDisplay>, QueueError> {
        let filter = DisplayFilter {
            facility_id: Some(facility_id),
            active_only,
        };
        Ok(self.store.list_displays(&filter)?)
    }
}

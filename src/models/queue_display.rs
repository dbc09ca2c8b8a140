use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ServicePoint;
use crate::config;

/// Named configuration for a public waiting-room board. Covers a set of
/// service points at one facility; the feed only serves active displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDisplay {
    pub id: Uuid,
    pub display_code: String,
    pub display_name: String,
    pub facility_id: Uuid,
    pub service_points: Vec<ServicePoint>,
    pub is_active: bool,
    pub settings: DisplaySettings,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Visual settings stored as JSON in the settings column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default = "default_max_display")]
    pub max_display: i64,
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: i64,
    #[serde(default)]
    pub show_patient_names: bool,
    #[serde(default = "default_true")]
    pub show_room_numbers: bool,
    #[serde(default)]
    pub announcement: Option<String>,
}

fn default_max_display() -> i64 {
    config::DEFAULT_MAX_DISPLAY
}

fn default_refresh_seconds() -> i64 {
    config::DEFAULT_REFRESH_SECONDS
}

fn default_true() -> bool {
    true
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            max_display: default_max_display(),
            refresh_seconds: default_refresh_seconds(),
            show_patient_names: false,
            show_room_numbers: true,
            announcement: None,
        }
    }
}

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lightweight visit stub created alongside each queue entry. The
/// clinical record proper lives in the encounter subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub facility_id: Uuid,
    pub visit_date: NaiveDate,
    pub chief_complaint: Option<String>,
    pub queue_number: Option<String>,
    pub created_by_id: Uuid,
    pub created_at: NaiveDateTime,
}

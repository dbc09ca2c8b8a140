use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ServicePoint;

/// One day's room assignment for a staff member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutyAssignment {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub facility_id: Uuid,
    pub duty_date: NaiveDate,
    pub service_point: Option<ServicePoint>,
    pub room_number: Option<String>,
}

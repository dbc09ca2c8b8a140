use chrono::NaiveDate;
use uuid::Uuid;

use super::enums::{QueueStatus, ServicePoint};

/// Filter for listing queue entries. `facility_id` is always required;
/// everything else narrows. Date defaults to today at the call site.
#[derive(Debug, Clone, Default)]
pub struct QueueFilter {
    pub facility_id: Option<Uuid>,
    pub service_point: Option<ServicePoint>,
    pub status: Option<QueueStatus>,
    pub department_id: Option<Uuid>,
    pub queue_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct DisplayFilter {
    pub facility_id: Option<Uuid>,
    pub active_only: bool,
}

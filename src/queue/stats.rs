use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::store::QueueStore;
use super::QueueError;
use crate::models::enums::{QueueStatus, ServicePoint};
use crate::models::filters::QueueFilter;

/// Live counts and average durations for a facility, optionally scoped
/// to one service point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Patients not yet in service: waiting plus called.
    pub waiting: i64,
    pub in_service: i64,
    pub completed: i64,
    pub no_show: i64,
    pub total: i64,
    pub average_wait_minutes: f64,
    pub average_service_minutes: f64,
}

/// Read-only aggregation over the day's entries. No caching — boards
/// poll at a coarse interval and the day's partition stays small.
pub struct StatsAggregator {
    store: Arc<dyn QueueStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    pub fn get_stats(
        &self,
        facility_id: Uuid,
        service_point: Option<ServicePoint>,
    ) -> Result<QueueStats, QueueError> {
        self.stats_for_date(facility_id, service_point, Local::now().naive_local().date())
    }

    pub fn stats_for_date(
        &self,
        facility_id: Uuid,
        service_point: Option<ServicePoint>,
        date: NaiveDate,
    ) -> Result<QueueStats, QueueError> {
        let filter = QueueFilter {
            facility_id: Some(facility_id),
            service_point,
            status: None,
            department_id: None,
            queue_date: Some(date),
        };
        let entries = self.store.list_entries(&filter)?;

        let mut stats = QueueStats {
            waiting: 0,
            in_service: 0,
            completed: 0,
            no_show: 0,
            total: entries.len() as i64,
            average_wait_minutes: 0.0,
            average_service_minutes: 0.0,
        };
        for entry in &entries {
            match entry.status {
                QueueStatus::Waiting | QueueStatus::Called => stats.waiting += 1,
                QueueStatus::InService => stats.in_service += 1,
                QueueStatus::Completed => stats.completed += 1,
                QueueStatus::NoShow => stats.no_show += 1,
                QueueStatus::Skipped | QueueStatus::Transferred | QueueStatus::Cancelled => {}
            }
        }

        stats.average_wait_minutes =
            mean(entries.iter().filter_map(|e| e.actual_wait_minutes));
        stats.average_service_minutes =
            mean(entries.iter().filter_map(|e| e.service_duration_minutes));
        Ok(stats)
    }
}

/// Mean of the values, 0 when there are none.
fn mean(values: impl Iterator<Item = i64>) -> f64 {
    let mut sum = 0i64;
    let mut count = 0i64;
    for value in values {
        sum += value;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

//! Facility service-point queue dispatcher.
//!
//! Admits patients into per-service-point waiting lines, hands out
//! monotonic ticket and sequence numbers, orders the line by priority
//! and arrival, and drives each entry through the
//! call/serve/complete/transfer lifecycle. Storage is SQLite behind the
//! [`queue::QueueStore`] seam; transport bindings are out of scope.

pub mod config;
pub mod db;
pub mod models;
pub mod patients;
pub mod queue;
pub mod staffing;
pub mod visits;

pub use patients::PatientDirectory;
pub use queue::{
    DispatchService, DisplayFeed, QueueError, QueueStore, SequenceAllocator, SqliteQueueStore,
    StatsAggregator,
};
pub use staffing::StaffDutyLookup;
pub use visits::VisitRecordCreator;

use tracing_subscriber::EnvFilter;

/// Initialize tracing. RUST_LOG overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);
}

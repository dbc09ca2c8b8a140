//! Queue dispatcher core: ticket allocation, call ordering, and the
//! entry lifecycle. Transport bindings live elsewhere; these services
//! take explicit facility and actor ids on every call.

pub mod dispatch;
pub mod display_feed;
pub mod sequence;
pub mod stats;
pub mod store;

pub use dispatch::{DispatchService, NewQueueEntry, QueueQuery, QueueTicket};
pub use display_feed::{BoardEntry, DisplayBoard, DisplayFeed, NewDisplay};
pub use sequence::SequenceAllocator;
pub use stats::{QueueStats, StatsAggregator};
pub use store::{QueueStore, SqliteQueueStore};

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::QueueStatus;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Invalid input: {reason}")]
    Validation { reason: String },

    #[error("Patient {patient_id} is already in queue with ticket {ticket_number}")]
    AlreadyQueued { patient_id: Uuid, ticket_number: String },

    #[error("Cannot {operation} an entry that is {}", .status.as_str())]
    InvalidTransition {
        operation: &'static str,
        status: QueueStatus,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

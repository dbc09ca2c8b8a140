//! Repository layer — entity-scoped database operations.
//!
//! Plain functions over `&Connection`, one sub-module per entity.
//! All public functions are re-exported here.

mod duty;
mod patient;
mod queue_display;
mod queue_entry;
mod visit;

pub use duty::*;
pub use patient::*;
pub use queue_display::*;
pub use queue_entry::*;
pub use visit::*;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::DatabaseError;

pub(crate) const DATE_FMT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn fmt_date(date: &NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

pub(crate) fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_opt_uuid(value: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    value.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(value, DATE_FMT)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_datetime(value: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(value, DATETIME_FMT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_opt_datetime(
    value: Option<String>,
) -> Result<Option<NaiveDateTime>, DatabaseError> {
    value.as_deref().map(parse_datetime).transpose()
}

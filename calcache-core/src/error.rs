//! Error types for calcache.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in cache, calendar and ingestion operations.
#[derive(Error, Debug)]
pub enum CalCacheError {
    #[error("Invalid event: {0}")]
    Validation(#[from] ValidationError),

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Calendar '{0}' is read-only")]
    ReadOnlyCalendar(String),

    #[error("Event '{0}' has no location and cannot be edited in place")]
    NoLocation(String),

    #[error("A note already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for calcache operations.
pub type CalCacheResult<T> = Result<T, CalCacheError>;

/// Why a raw event was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown event type '{0}'")]
    UnknownType(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("all-day flag disagrees with start/end times")]
    TimingMismatch,

    #[error("'{end}' is before '{start}'")]
    EndBeforeStart {
        start: &'static str,
        end: &'static str,
    },

    #[error("recurring event has no days of week")]
    NoDaysOfWeek,

    #[error("malformed frontmatter: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for CalCacheError {
    fn from(err: reqwest::Error) -> Self {
        CalCacheError::Fetch(err.to_string())
    }
}

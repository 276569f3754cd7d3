//! Error types for calspan.

use thiserror::Error;

use crate::event::ValidationError;

/// Errors that can occur in calspan operations.
#[derive(Error, Debug)]
pub enum CalSpanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid interval: end {end} is before start {start}")]
    InvalidInterval { start: i64, end: i64 },

    #[error("Invalid calendar id '{0}'")]
    InvalidCalendarId(String),

    #[error("Recurrence error: {0}")]
    Recurrence(String),

    #[error("Event failed validation: {}", display_validation(.0))]
    Validation(Vec<ValidationError>),

    #[error("Alarm offset {0}s is out of range")]
    AlarmOutOfRange(i64),

    #[error("Busytime references unknown event '{0}'")]
    OrphanBusytime(String),

    #[error("Event has no id")]
    MissingEventId,

    #[error("Query was cancelled")]
    Cancelled,
}

fn display_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for calspan operations.
pub type CalSpanResult<T> = Result<T, CalSpanError>;

//! crates/lesson_tracker_core/src/error.rs
//!
//! The error taxonomy surfaced to callers of the core.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum LessonError {
    /// Sign-in or resume could not produce a session.
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    /// A collection operation was attempted without an active session.
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Failed to write record: {0}")]
    RecordWriteFailed(#[source] PortError),

    #[error("Failed to read records: {0}")]
    RecordReadFailed(#[source] PortError),

    #[error("Failed to delete record: {0}")]
    RecordDeleteFailed(#[source] PortError),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid record key: '{0}'")]
    InvalidRecordKey(String),

    /// The persisted session copy could not be purged.
    #[error("Session storage error: {0}")]
    Storage(#[source] PortError),
}

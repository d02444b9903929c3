//! crates/lesson_tracker_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture: the delegated
//! authorization client, the repository transport and durable session storage
//! all live behind them, so the core never touches a socket or a file.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{Did, Session};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (network, storage).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Request rejected ({status}): {error}: {message}")]
    Rejected {
        status: u16,
        error: String,
        message: String,
    },
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Repository Wire Shapes
//=========================================================================================

/// What the repository returns for a newly created record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub uri: String,
    pub cid: String,
}

/// One entry of a record listing, body still unparsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedRecord {
    pub uri: String,
    pub cid: Option<String>,
    pub value: Value,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AuthorizationClient: Send + Sync {
    /// Recovers a previously established session.
    ///
    /// `Ok(None)` means there was nothing to resume, which is not a failure.
    async fn resume_session(&self) -> PortResult<Option<Session>>;

    /// Runs the interactive handshake for a handle (or DID) and waits for it to finish.
    async fn sign_in(&self, identifier_hint: &str) -> PortResult<Session>;
}

#[async_trait]
pub trait RepositoryApi: Send + Sync {
    async fn create_record(
        &self,
        session: &Session,
        repo: &Did,
        collection: &str,
        record: Value,
    ) -> PortResult<RecordRef>;

    /// Lists the first page of a collection in server order.
    async fn list_records(
        &self,
        session: &Session,
        repo: &Did,
        collection: &str,
        limit: u32,
    ) -> PortResult<Vec<ListedRecord>>;

    async fn delete_record(
        &self,
        session: &Session,
        repo: &Did,
        collection: &str,
        rkey: &str,
    ) -> PortResult<()>;
}

#[async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn load(&self, key: &str) -> PortResult<Option<Session>>;

    async fn save(&self, key: &str, session: &Session) -> PortResult<()>;

    /// Removes the entry under `key`, reporting whether one existed.
    async fn remove(&self, key: &str) -> PortResult<bool>;
}

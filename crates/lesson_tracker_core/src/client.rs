//! crates/lesson_tracker_core/src/client.rs
//!
//! Derives authenticated repository clients from sessions.

use serde_json::Value;
use std::sync::Arc;

use crate::domain::{Did, Session};
use crate::ports::{ListedRecord, PortResult, RecordRef, RepositoryApi};

/// Builds `AuthenticatedClient`s on top of one repository transport.
#[derive(Clone)]
pub struct ClientFactory {
    api: Arc<dyn RepositoryApi>,
}

impl ClientFactory {
    pub fn new(api: Arc<dyn RepositoryApi>) -> Self {
        Self { api }
    }

    /// Binds a client to `session`. The result depends on nothing else.
    pub fn build(&self, session: &Arc<Session>) -> AuthenticatedClient {
        AuthenticatedClient {
            session: Arc::clone(session),
            api: Arc::clone(&self.api),
        }
    }
}

/// Issues repository requests as the owner of exactly one session.
///
/// Every request is addressed to the bound session's DID; there is no way to
/// point a client at a different repository.
#[derive(Clone)]
pub struct AuthenticatedClient {
    session: Arc<Session>,
    api: Arc<dyn RepositoryApi>,
}

impl AuthenticatedClient {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn owner(&self) -> &Did {
        &self.session.did
    }

    pub async fn create_record(&self, collection: &str, record: Value) -> PortResult<RecordRef> {
        self.api
            .create_record(&self.session, self.owner(), collection, record)
            .await
    }

    pub async fn list_records(&self, collection: &str, limit: u32) -> PortResult<Vec<ListedRecord>> {
        self.api
            .list_records(&self.session, self.owner(), collection, limit)
            .await
    }

    pub async fn delete_record(&self, collection: &str, rkey: &str) -> PortResult<()> {
        self.api
            .delete_record(&self.session, self.owner(), collection, rkey)
            .await
    }
}

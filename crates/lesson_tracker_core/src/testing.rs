//! In-memory port implementations shared by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::domain::{Did, Session, SessionCredentials};
use crate::ports::{
    AuthorizationClient, ListedRecord, PortError, PortResult, RecordRef, RepositoryApi,
    SessionPersistence,
};
use crate::session::{MemorySessionPersistence, SESSION_STORAGE_KEY};

pub fn session_for(did: &str) -> Session {
    Session::new(
        Did::new(did).unwrap(),
        None,
        SessionCredentials {
            service_endpoint: "https://pds.example".to_string(),
            access_token: format!("token-{did}"),
            token_type: "DPoP".to_string(),
            refresh_token: None,
            expires_at: None,
            scope: None,
        },
    )
}

struct StoredEntry {
    repo: String,
    collection: String,
    rkey: String,
    cid: String,
    value: Value,
}

/// A repository that keeps records in memory and lists them newest first.
#[derive(Default)]
pub struct FakeRepository {
    records: Mutex<Vec<StoredEntry>>,
    addressed: Mutex<Vec<String>>,
    calls: AtomicUsize,
    next_key: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn addressed_repos(&self) -> Vec<String> {
        self.addressed.lock().clone()
    }

    /// Puts a raw record into the repository without going through the API.
    pub fn insert_raw(&self, repo: &str, collection: &str, rkey: &str, value: Value) {
        self.records.lock().push(StoredEntry {
            repo: repo.to_string(),
            collection: collection.to_string(),
            rkey: rkey.to_string(),
            cid: format!("cid-{rkey}"),
            value,
        });
    }

    fn record_call(&self, repo: &Did) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.addressed.lock().push(repo.as_str().to_string());
    }
}

#[async_trait]
impl RepositoryApi for FakeRepository {
    async fn create_record(
        &self,
        _session: &Session,
        repo: &Did,
        collection: &str,
        record: Value,
    ) -> PortResult<RecordRef> {
        self.record_call(repo);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PortError::Transport("connection reset".to_string()));
        }
        let rkey = format!("3k{:04}", self.next_key.fetch_add(1, Ordering::SeqCst));
        self.insert_raw(repo.as_str(), collection, &rkey, record);
        Ok(RecordRef {
            uri: format!("at://{}/{}/{}", repo, collection, rkey),
            cid: format!("cid-{rkey}"),
        })
    }

    async fn list_records(
        &self,
        _session: &Session,
        repo: &Did,
        collection: &str,
        limit: u32,
    ) -> PortResult<Vec<ListedRecord>> {
        self.record_call(repo);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(PortError::Transport("connection reset".to_string()));
        }
        let records = self.records.lock();
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.repo == repo.as_str() && r.collection == collection)
            .take(limit as usize)
            .map(|r| ListedRecord {
                uri: format!("at://{}/{}/{}", r.repo, r.collection, r.rkey),
                cid: Some(r.cid.clone()),
                value: r.value.clone(),
            })
            .collect())
    }

    async fn delete_record(
        &self,
        _session: &Session,
        repo: &Did,
        collection: &str,
        rkey: &str,
    ) -> PortResult<()> {
        self.record_call(repo);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(PortError::Unauthorized);
        }
        self.records
            .lock()
            .retain(|r| !(r.repo == repo.as_str() && r.collection == collection && r.rkey == rkey));
        Ok(())
    }
}

/// Wraps a `FakeRepository` so that tests can hold create and list calls
/// inside the repository while they change the session.
pub struct GatedRepository {
    pub inner: FakeRepository,
    pub gate: tokio::sync::Mutex<()>,
    pub entered: Notify,
}

impl GatedRepository {
    pub fn new() -> Self {
        Self {
            inner: FakeRepository::new(),
            gate: tokio::sync::Mutex::new(()),
            entered: Notify::new(),
        }
    }

    async fn pass(&self) {
        self.entered.notify_one();
        let _open = self.gate.lock().await;
    }
}

#[async_trait]
impl RepositoryApi for GatedRepository {
    async fn create_record(
        &self,
        session: &Session,
        repo: &Did,
        collection: &str,
        record: Value,
    ) -> PortResult<RecordRef> {
        self.pass().await;
        self.inner.create_record(session, repo, collection, record).await
    }

    async fn list_records(
        &self,
        session: &Session,
        repo: &Did,
        collection: &str,
        limit: u32,
    ) -> PortResult<Vec<ListedRecord>> {
        self.pass().await;
        self.inner.list_records(session, repo, collection, limit).await
    }

    async fn delete_record(
        &self,
        session: &Session,
        repo: &Did,
        collection: &str,
        rkey: &str,
    ) -> PortResult<()> {
        self.inner.delete_record(session, repo, collection, rkey).await
    }
}

/// An authorization client that signs everyone in as a fixed DID and
/// persists the session the way the real adapter does.
pub struct FakeAuthorization {
    did: String,
    pub persistence: Arc<MemorySessionPersistence>,
    pub fail_resume: AtomicBool,
    pub fail_sign_in: AtomicBool,
}

impl FakeAuthorization {
    pub fn new(did: &str) -> Self {
        Self {
            did: did.to_string(),
            persistence: Arc::new(MemorySessionPersistence::new()),
            fail_resume: AtomicBool::new(false),
            fail_sign_in: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AuthorizationClient for FakeAuthorization {
    async fn resume_session(&self) -> PortResult<Option<Session>> {
        if self.fail_resume.load(Ordering::SeqCst) {
            return Err(PortError::InvalidResponse("corrupt session".to_string()));
        }
        self.persistence.load(SESSION_STORAGE_KEY).await
    }

    async fn sign_in(&self, identifier_hint: &str) -> PortResult<Session> {
        if self.fail_sign_in.load(Ordering::SeqCst) {
            return Err(PortError::Rejected {
                status: 400,
                error: "access_denied".to_string(),
                message: "The user denied the request".to_string(),
            });
        }
        let mut session = session_for(&self.did);
        session.handle = Some(identifier_hint.to_string());
        self.persistence.save(SESSION_STORAGE_KEY, &session).await?;
        Ok(session)
    }
}

/// Persistence whose removal always fails.
pub struct BrokenPersistence;

#[async_trait]
impl SessionPersistence for BrokenPersistence {
    async fn load(&self, _key: &str) -> PortResult<Option<Session>> {
        Ok(None)
    }

    async fn save(&self, _key: &str, _session: &Session) -> PortResult<()> {
        Err(PortError::Storage("read-only".to_string()))
    }

    async fn remove(&self, _key: &str) -> PortResult<bool> {
        Err(PortError::Storage("read-only".to_string()))
    }
}

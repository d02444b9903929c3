//! crates/lesson_tracker_core/src/collection.rs
//!
//! The record-collection access layer: create, list and delete lesson records
//! in the signed-in owner's repository, and the local cache that mirrors the
//! last successful listing.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::client::{AuthenticatedClient, ClientFactory};
use crate::domain::{
    record_key_of, timestamp_now, validate_namespace, CreatedRecord, Did, DomainError,
    LessonRecord, NewLesson, RecordUri, StoredLesson, LESSON_COLLECTION,
};
use crate::error::LessonError;
use crate::ports::{ListedRecord, PortError};
use crate::session::SessionStore;

/// Records requested per listing. Only the first page is fetched.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Access to one record collection in the current owner's repository.
///
/// The cache is only ever replaced by a complete listing. Mutations and
/// listings through one `LessonCollection` are serialized, so a mutation's
/// follow-up refresh always finishes before the next mutation starts.
pub struct LessonCollection {
    collection: String,
    page_size: u32,
    store: Arc<SessionStore>,
    factory: ClientFactory,
    client: Mutex<Option<AuthenticatedClient>>,
    cache: RwLock<Vec<StoredLesson>>,
    sync: tokio::sync::Mutex<()>,
}

impl LessonCollection {
    /// A layer over the default lesson collection.
    pub fn new(store: Arc<SessionStore>, factory: ClientFactory) -> Self {
        Self {
            collection: LESSON_COLLECTION.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            store,
            factory,
            client: Mutex::new(None),
            cache: RwLock::new(Vec::new()),
            sync: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_collection(
        store: Arc<SessionStore>,
        factory: ClientFactory,
        collection: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let collection = collection.into();
        validate_namespace(&collection)?;
        Ok(Self {
            collection,
            ..Self::new(store, factory)
        })
    }

    /// Sets the listing page size, clamped to `1..=100`.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Snapshot of the last successful listing.
    pub fn cached(&self) -> Vec<StoredLesson> {
        self.cache.read().clone()
    }

    /// Forgets the derived client and the cache; called whenever the session changes.
    pub fn reset(&self) {
        self.client.lock().take();
        self.cache.write().clear();
        debug!(collection = %self.collection, "Collection state reset.");
    }

    /// Writes a new lesson record, then refreshes the cache from the server.
    pub async fn create(&self, lesson: NewLesson) -> Result<CreatedRecord, LessonError> {
        self.ensure_authenticated()?;
        lesson.validate().map_err(LessonError::InvalidRecord)?;

        let _guard = self.sync.lock().await;
        let client = self.client()?;
        let record = lesson.into_record(&self.collection, timestamp_now());
        let body =
            serde_json::to_value(&record).map_err(|e| LessonError::InvalidRecord(e.to_string()))?;

        let created = client
            .create_record(&self.collection, body)
            .await
            .map_err(|e| {
                error!(owner = %client.owner(), "Failed to create lesson record: {}", e);
                LessonError::RecordWriteFailed(e)
            })?;
        let uri = RecordUri::parse(&created.uri).map_err(|e| {
            LessonError::RecordWriteFailed(PortError::InvalidResponse(e.to_string()))
        })?;
        info!(uri = %uri, "Lesson record created.");

        self.refresh(&client).await?;
        Ok(CreatedRecord {
            uri,
            cid: created.cid,
        })
    }

    /// Fetches the first page of the collection and replaces the cache with it.
    ///
    /// Fails with `NotAuthenticated` if the session is replaced or cleared
    /// before the listing arrives.
    pub async fn list(&self) -> Result<Vec<StoredLesson>, LessonError> {
        self.ensure_authenticated()?;
        let _guard = self.sync.lock().await;
        let client = self.client()?;
        self.refresh(&client)
            .await?
            .ok_or(LessonError::NotAuthenticated)
    }

    /// Deletes a record given its bare key or its full locator, then refreshes.
    pub async fn delete(&self, key_or_uri: &str) -> Result<(), LessonError> {
        self.ensure_authenticated()?;
        let rkey = record_key_of(key_or_uri.trim());
        if rkey.is_empty() {
            return Err(LessonError::InvalidRecordKey(key_or_uri.to_string()));
        }

        let _guard = self.sync.lock().await;
        let client = self.client()?;
        client
            .delete_record(&self.collection, rkey)
            .await
            .map_err(|e| {
                error!(owner = %client.owner(), rkey, "Failed to delete lesson record: {}", e);
                LessonError::RecordDeleteFailed(e)
            })?;
        info!(rkey, "Lesson record deleted.");

        self.refresh(&client).await?;
        Ok(())
    }

    fn ensure_authenticated(&self) -> Result<(), LessonError> {
        if self.store.is_authenticated() {
            Ok(())
        } else {
            Err(LessonError::NotAuthenticated)
        }
    }

    /// Returns a client for the current session, rebuilding it if the session changed.
    ///
    /// Must be called with `sync` held, so that a queued operation picks up
    /// whatever session is current when its turn comes.
    fn client(&self) -> Result<AuthenticatedClient, LessonError> {
        let session = self.store.get().ok_or(LessonError::NotAuthenticated)?;
        let mut slot = self.client.lock();
        match slot.as_ref() {
            Some(client) if Arc::ptr_eq(client.session(), &session) => Ok(client.clone()),
            _ => {
                let client = self.factory.build(&session);
                debug!(owner = %client.owner(), "Built authenticated client.");
                *slot = Some(client.clone());
                Ok(client)
            }
        }
    }

    /// Replaces the cache with a fresh listing for `client`'s session.
    ///
    /// Returns `None` when that session stopped being current, either before
    /// the request or while it was in flight; the cache is left alone then.
    async fn refresh(
        &self,
        client: &AuthenticatedClient,
    ) -> Result<Option<Vec<StoredLesson>>, LessonError> {
        if !self.store.is_current(client.session()) {
            warn!(owner = %client.owner(), "Session changed; skipping cache refresh.");
            return Ok(None);
        }

        let listed = client
            .list_records(&self.collection, self.page_size)
            .await
            .map_err(|e| {
                warn!(owner = %client.owner(), "Failed to list lesson records: {}", e);
                LessonError::RecordReadFailed(e)
            })?;
        let lessons = self.parse_listing(listed, client.owner());

        if !self.store.is_current(client.session()) {
            warn!(owner = %client.owner(), "Session changed during listing; discarding it.");
            return Ok(None);
        }
        *self.cache.write() = lessons.clone();
        debug!(count = lessons.len(), "Lesson cache refreshed.");
        Ok(Some(lessons))
    }

    fn parse_listing(&self, listed: Vec<ListedRecord>, owner: &Did) -> Vec<StoredLesson> {
        listed
            .into_iter()
            .filter_map(|entry| match self.parse_entry(entry, owner) {
                Ok(lesson) => Some(lesson),
                Err(reason) => {
                    warn!("Skipping unreadable record: {}", reason);
                    None
                }
            })
            .collect()
    }

    fn parse_entry(&self, entry: ListedRecord, owner: &Did) -> Result<StoredLesson, String> {
        let uri = RecordUri::parse(&entry.uri).map_err(|e| e.to_string())?;
        if uri.authority() != owner.as_str() || uri.collection() != self.collection {
            return Err(format!("{} is outside {}", uri, self.collection));
        }
        let value: LessonRecord =
            serde_json::from_value(entry.value).map_err(|e| format!("{}: {}", uri, e))?;
        value
            .validate(&self.collection)
            .map_err(|e| format!("{}: {}", uri, e))?;
        Ok(StoredLesson {
            uri,
            cid: entry.cid,
            value,
        })
    }
}

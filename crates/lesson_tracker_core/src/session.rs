//! crates/lesson_tracker_core/src/session.rs
//!
//! The process-wide holder of the current session.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::domain::Session;
use crate::ports::{PortResult, SessionPersistence};

/// Key under which the authorization adapter persists the session.
pub const SESSION_STORAGE_KEY: &str = "lesson_tracker.session";

/// Holds zero or one session for the lifetime of the process.
///
/// One store is created at startup and shared by reference with everything
/// that needs to know who is signed in.
pub struct SessionStore {
    current: RwLock<Option<Arc<Session>>>,
    persistence: Arc<dyn SessionPersistence>,
}

impl SessionStore {
    pub fn new(persistence: Arc<dyn SessionPersistence>) -> Self {
        Self {
            current: RwLock::new(None),
            persistence,
        }
    }

    pub fn get(&self) -> Option<Arc<Session>> {
        self.current.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    /// Replaces the current session unconditionally.
    pub fn set(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        let previous = self.current.write().replace(Arc::clone(&session));
        match previous {
            Some(previous) if previous.did != session.did => {
                info!(from = %previous.did, to = %session.did, "Session replaced.")
            }
            _ => info!(did = %session.did, "Session stored."),
        }
        session
    }

    /// True when `session` is the very value the store currently holds.
    pub fn is_current(&self, session: &Arc<Session>) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, session))
    }

    /// Drops the in-memory session and purges the persisted copy.
    ///
    /// The in-memory session is gone even if the purge fails; the purge error
    /// is returned so logout is never reported as complete when it is not.
    pub async fn clear(&self) -> PortResult<()> {
        let previous = self.current.write().take();
        if let Some(previous) = &previous {
            info!(did = %previous.did, "Clearing session.");
        }

        match self.persistence.remove(SESSION_STORAGE_KEY).await {
            Ok(true) => {
                debug!("Persisted session removed.");
                Ok(())
            }
            Ok(false) => {
                debug!("No persisted session to remove.");
                Ok(())
            }
            Err(e) => {
                error!("Failed to remove persisted session: {}", e);
                Err(e)
            }
        }
    }
}

//=========================================================================================
// In-Memory Persistence
//=========================================================================================

/// A `SessionPersistence` that lives only as long as the process.
#[derive(Default)]
pub struct MemorySessionPersistence {
    entries: Mutex<HashMap<String, Session>>,
}

impl MemorySessionPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionPersistence for MemorySessionPersistence {
    async fn load(&self, key: &str) -> PortResult<Option<Session>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn save(&self, key: &str, session: &Session) -> PortResult<()> {
        self.entries.lock().insert(key.to_string(), session.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

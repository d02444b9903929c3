//! crates/lesson_tracker_core/src/app.rs
//!
//! Ties the authorization client, the session store and the lesson collection
//! together and drives the signed-out / signed-in state machine.

use std::sync::Arc;
use tracing::{info, warn};

use crate::collection::LessonCollection;
use crate::domain::Session;
use crate::error::LessonError;
use crate::ports::AuthorizationClient;
use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
}

/// The application core, created once per process.
pub struct LessonTracker {
    auth: Arc<dyn AuthorizationClient>,
    store: Arc<SessionStore>,
    lessons: LessonCollection,
}

impl LessonTracker {
    pub fn new(
        auth: Arc<dyn AuthorizationClient>,
        store: Arc<SessionStore>,
        lessons: LessonCollection,
    ) -> Self {
        Self {
            auth,
            store,
            lessons,
        }
    }

    /// Startup phase: tries once to resume a previous session.
    ///
    /// A failed resume is logged and treated as being signed out.
    pub async fn start(&self) -> AuthState {
        match self.auth.resume_session().await {
            Ok(Some(session)) => {
                info!(did = %session.did, "Resumed previous session.");
                self.store.set(session);
                self.lessons.reset();
                AuthState::Authenticated
            }
            Ok(None) => {
                info!("No previous session to resume.");
                AuthState::Unauthenticated
            }
            Err(e) => {
                warn!("Failed to resume session, starting signed out: {}", e);
                AuthState::Unauthenticated
            }
        }
    }

    /// Runs the interactive handshake and installs the resulting session.
    ///
    /// On failure the current state is left untouched.
    pub async fn sign_in(&self, identifier_hint: &str) -> Result<Arc<Session>, LessonError> {
        let session = self.auth.sign_in(identifier_hint).await.map_err(|e| {
            warn!(hint = identifier_hint, "Sign-in failed: {}", e);
            LessonError::AuthorizationFailed(e.to_string())
        })?;
        let session = self.store.set(session);
        self.lessons.reset();
        info!(did = %session.did, "Signed in.");
        Ok(session)
    }

    /// Signs out, removing both the in-memory and the persisted session.
    pub async fn logout(&self) -> Result<(), LessonError> {
        let result = self.store.clear().await;
        self.lessons.reset();
        result.map_err(LessonError::Storage)?;
        info!("Signed out.");
        Ok(())
    }

    pub fn state(&self) -> AuthState {
        if self.store.is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        }
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.store.get()
    }

    pub fn lessons(&self) -> &LessonCollection {
        &self.lessons
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }
}

//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::{OAuthAdapter, PromptChannel};
use crate::config::Config;
use lesson_tracker_core::LessonTracker;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<LessonTracker>,
    /// The authorization adapter, needed directly by the redirect callback.
    pub oauth: Arc<OAuthAdapter>,
    /// Where the adapter publishes authorization URLs for the login handler.
    pub prompts: PromptChannel,
    pub config: Arc<Config>,
}

//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use lesson_tracker_core::AuthState;
use std::sync::Arc;

use crate::web::state::AppState;

/// Middleware that only lets requests through while a session is active.
///
/// Without one, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.tracker.state() != AuthState::Authenticated {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}

//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: starting a sign-in, the authorization redirect
//! callback, the current session and logout.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};
use lesson_tracker_core::ClientMetadata;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::adapters::CallbackParams;
use crate::web::rest::lesson_error_response;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    /// A handle such as `alice.example.social`, or a DID.
    pub handle: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// Where to send the user's browser to approve access.
    pub authorization_url: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub did: String,
    pub handle: Option<String>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /client-metadata.json - The OAuth client metadata document
pub async fn client_metadata_handler(State(state): State<Arc<AppState>>) -> Json<ClientMetadata> {
    Json(state.oauth.config().metadata().clone())
}

/// POST /auth/login - Start signing in
///
/// The sign-in keeps running in the background until the redirect callback
/// arrives; this handler returns as soon as the authorization URL is known.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authorization started", body = LoginResponse),
        (status = 400, description = "Missing handle"),
        (status = 401, description = "The handle could not be resolved or authorization failed"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let handle = req.handle.trim().to_string();
    if handle.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "handle is required".to_string()));
    }

    // Subscribe before starting so the published URL cannot be missed.
    let mut prompts = state.prompts.subscribe();
    let tracker = state.tracker.clone();
    let mut sign_in = tokio::spawn(async move { tracker.sign_in(&handle).await });

    tokio::select! {
        changed = prompts.changed() => {
            changed.map_err(|e| {
                error!("Authorization prompt channel closed: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start sign-in".to_string())
            })?;
            let authorization_url = prompts.borrow_and_update().clone().ok_or_else(|| {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start sign-in".to_string())
            })?;
            Ok(Json(LoginResponse { authorization_url }))
        }
        joined = &mut sign_in => {
            match joined {
                Ok(Ok(session)) => {
                    warn!(did = %session.did, "Sign-in finished without an authorization step.");
                    Err((StatusCode::CONFLICT, "Already signed in".to_string()))
                }
                Ok(Err(e)) => Err(lesson_error_response(e)),
                Err(e) => {
                    error!("Sign-in task failed: {:?}", e);
                    Err((StatusCode::INTERNAL_SERVER_ERROR, "Failed to start sign-in".to_string()))
                }
            }
        }
    }
}

/// GET /oauth/callback - Redirect target of the authorization server
pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let did = state.oauth.complete(params).await.map_err(|e| {
        warn!("Authorization callback rejected: {}", e);
        (StatusCode::BAD_REQUEST, format!("Sign-in failed: {}", e))
    })?;
    info!(did = %did, "Authorization callback completed.");
    Ok(Html(format!(
        "<p>Signed in as {}. You can close this window.</p>",
        did
    )))
}

/// GET /auth/session - The current session
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "No active session")
    )
)]
pub async fn session_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .tracker
        .session()
        .ok_or((StatusCode::UNAUTHORIZED, "No active session".to_string()))?;
    Ok(Json(SessionResponse {
        did: session.did.to_string(),
        handle: session.handle.clone(),
    }))
}

/// POST /auth/logout - Sign out and forget the persisted session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logout successful"),
        (status = 500, description = "The persisted session could not be removed")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .tracker
        .logout()
        .await
        .map_err(lesson_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

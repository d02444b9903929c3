//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the lesson endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::auth::{LoginRequest, LoginResponse, SessionResponse};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use lesson_tracker_core::{LessonError, NewLesson, StoredLesson};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::login_handler,
        crate::web::auth::session_handler,
        crate::web::auth::logout_handler,
        list_lessons_handler,
        cached_lessons_handler,
        create_lesson_handler,
        delete_lesson_handler,
    ),
    components(
        schemas(
            LoginRequest,
            LoginResponse,
            SessionResponse,
            CreateLessonRequest,
            CreateLessonResponse,
            LessonView
        )
    ),
    tags(
        (name = "Piano Lesson Tracker API", description = "Sign in and manage completed piano lessons in your own repository.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A completed lesson to record.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLessonRequest {
    pub lesson_id: String,
    /// RFC 3339 timestamp of when the lesson was finished.
    pub completed_at: String,
    pub score: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The response payload sent after successfully recording a lesson.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreateLessonResponse {
    pub uri: String,
    pub cid: String,
}

/// A lesson as stored in the signed-in user's repository.
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LessonView {
    pub uri: String,
    pub rkey: String,
    pub cid: Option<String>,
    pub lesson_id: String,
    pub completed_at: String,
    pub score: f64,
    pub notes: Option<String>,
    pub created_at: String,
}

impl From<StoredLesson> for LessonView {
    fn from(lesson: StoredLesson) -> Self {
        Self {
            uri: lesson.uri.to_string(),
            rkey: lesson.rkey().to_string(),
            cid: lesson.cid,
            lesson_id: lesson.value.lesson_id,
            completed_at: lesson.value.completed_at,
            score: lesson.value.score,
            notes: lesson.value.notes,
            created_at: lesson.value.created_at,
        }
    }
}

/// Translates a core error into the status code and message sent to the caller.
pub(crate) fn lesson_error_response(e: LessonError) -> (StatusCode, String) {
    let status = match &e {
        LessonError::NotAuthenticated | LessonError::AuthorizationFailed(_) => {
            StatusCode::UNAUTHORIZED
        }
        LessonError::InvalidRecord(_) | LessonError::InvalidRecordKey(_) => {
            StatusCode::BAD_REQUEST
        }
        LessonError::RecordWriteFailed(_)
        | LessonError::RecordReadFailed(_)
        | LessonError::RecordDeleteFailed(_) => StatusCode::BAD_GATEWAY,
        LessonError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    (status, e.to_string())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the signed-in user's lessons, refreshing the local cache.
#[utoipa::path(
    get,
    path = "/lessons",
    responses(
        (status = 200, description = "Lessons in repository order", body = [LessonView]),
        (status = 401, description = "No active session"),
        (status = 502, description = "The repository could not be read")
    )
)]
pub async fn list_lessons_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let lessons = app_state
        .tracker
        .lessons()
        .list()
        .await
        .map_err(lesson_error_response)?;
    Ok(Json(
        lessons.into_iter().map(LessonView::from).collect::<Vec<_>>(),
    ))
}

/// Return the lessons from the last successful listing without contacting the repository.
#[utoipa::path(
    get,
    path = "/lessons/cached",
    responses(
        (status = 200, description = "Cached lessons", body = [LessonView]),
        (status = 401, description = "No active session")
    )
)]
pub async fn cached_lessons_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let lessons = app_state.tracker.lessons().cached();
    Json(
        lessons.into_iter().map(LessonView::from).collect::<Vec<_>>(),
    )
}

/// Record a completed lesson.
#[utoipa::path(
    post,
    path = "/lessons",
    request_body = CreateLessonRequest,
    responses(
        (status = 201, description = "Lesson recorded", body = CreateLessonResponse),
        (status = 400, description = "Invalid lesson payload"),
        (status = 401, description = "No active session"),
        (status = 502, description = "The repository rejected the write")
    )
)]
pub async fn create_lesson_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut lesson = NewLesson::new(req.lesson_id, req.completed_at, req.score);
    if let Some(notes) = req.notes {
        lesson = lesson.with_notes(notes);
    }
    let created = app_state
        .tracker
        .lessons()
        .create(lesson)
        .await
        .map_err(lesson_error_response)?;

    let response = CreateLessonResponse {
        uri: created.uri.to_string(),
        cid: created.cid,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Delete a lesson by its record key.
#[utoipa::path(
    delete,
    path = "/lessons/{rkey}",
    responses(
        (status = 204, description = "Lesson deleted"),
        (status = 400, description = "Unusable record key"),
        (status = 401, description = "No active session"),
        (status = 502, description = "The repository rejected the delete")
    ),
    params(
        ("rkey" = String, Path, description = "The record key of the lesson.")
    )
)]
pub async fn delete_lesson_handler(
    State(app_state): State<Arc<AppState>>,
    Path(rkey): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .tracker
        .lessons()
        .delete(&rkey)
        .await
        .map_err(lesson_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

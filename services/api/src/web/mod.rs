pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_auth;
pub use rest::{
    cached_lessons_handler, create_lesson_handler, delete_lesson_handler, list_lessons_handler,
};

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use state::AppState;
use std::sync::Arc;

/// Builds the API router: public auth routes plus the session-gated lesson routes.
pub fn router(app_state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/client-metadata.json", get(auth::client_metadata_handler))
        .route("/oauth/callback", get(auth::callback_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/session", get(auth::session_handler))
        .route("/auth/logout", post(auth::logout_handler));

    let protected_routes = Router::new()
        .route(
            "/lessons",
            get(list_lessons_handler).post(create_lesson_handler),
        )
        .route("/lessons/cached", get(cached_lessons_handler))
        .route("/lessons/{rkey}", delete(delete_lesson_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}

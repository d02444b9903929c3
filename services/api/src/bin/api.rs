//! services/api/src/bin/api.rs

use lesson_api::{
    adapters::{FileSessionPersistence, OAuthAdapter, PromptChannel, XrpcRepositoryAdapter},
    config::Config,
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use lesson_tracker_core::{
    AuthState, ClientFactory, LessonCollection, LessonTracker, SessionPersistence, SessionStore,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Service Adapters ---
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

    let persistence: Arc<dyn SessionPersistence> =
        Arc::new(FileSessionPersistence::new(config.session_file.clone()));
    let prompts = PromptChannel::new();
    let oauth = Arc::new(OAuthAdapter::new(
        config.authorization_config()?,
        config.authorization_server.clone(),
        config.pds_url.clone(),
        http.clone(),
        persistence.clone(),
        Arc::new(prompts.clone()),
    ));
    let repository = Arc::new(XrpcRepositoryAdapter::new(http));

    // --- 3. Build the Core ---
    let store = Arc::new(SessionStore::new(persistence));
    let lessons = LessonCollection::with_collection(
        store.clone(),
        ClientFactory::new(repository),
        config.collection.clone(),
    )
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .with_page_size(config.page_size);
    let tracker = Arc::new(LessonTracker::new(oauth.clone(), store, lessons));

    match tracker.start().await {
        AuthState::Authenticated => info!("Resumed the previous session."),
        AuthState::Unauthenticated => info!("Waiting for sign-in at POST /auth/login."),
    }

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        tracker,
        oauth,
        prompts,
        config: config.clone(),
    });

    let origin = config
        .public_url
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("PUBLIC_URL is not a valid origin: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(web::router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

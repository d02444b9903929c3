//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use lesson_tracker_core::{
    AuthorizationConfig, ClientMetadata, DEFAULT_PAGE_SIZE, DEFAULT_SCOPE, LESSON_COLLECTION,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub public_url: String,
    pub client_name: String,
    pub client_id: String,
    pub redirect_uris: Vec<String>,
    pub scope: String,
    pub handle_resolver: String,
    pub authorization_server: String,
    pub pds_url: String,
    pub session_file: PathBuf,
    pub collection: String,
    pub page_size: u32,
    pub http_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "127.0.0.1:8080");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Application Identity ---
        let public_url = var_or("PUBLIC_URL", "http://127.0.0.1:8080")
            .trim_end_matches('/')
            .to_string();
        let client_name = var_or("CLIENT_NAME", "Piano Lesson Tracker");
        let client_id = var_or("CLIENT_ID", &format!("{}/client-metadata.json", public_url));
        let redirect_uris: Vec<String> =
            var_or("REDIRECT_URIS", &format!("{}/oauth/callback", public_url))
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        if redirect_uris.is_empty() {
            return Err(ConfigError::InvalidValue(
                "REDIRECT_URIS".to_string(),
                "at least one redirect URI is required".to_string(),
            ));
        }
        let scope = var_or("OAUTH_SCOPE", DEFAULT_SCOPE);

        // --- Remote Services ---
        let handle_resolver = var_or("HANDLE_RESOLVER", "https://bsky.social");
        let authorization_server = var_or("AUTHORIZATION_SERVER", "https://bsky.social");
        let pds_url = var_or("PDS_URL", "https://bsky.social");

        // --- Storage and Collection ---
        let session_file = PathBuf::from(var_or("SESSION_FILE", "./lesson_session.json"));
        let collection = var_or("LESSON_COLLECTION", LESSON_COLLECTION);

        let page_size_str = var_or("LIST_PAGE_SIZE", &DEFAULT_PAGE_SIZE.to_string());
        let page_size = page_size_str
            .parse::<u32>()
            .ok()
            .filter(|n| (1..=DEFAULT_PAGE_SIZE).contains(n))
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "LIST_PAGE_SIZE".to_string(),
                    format!("'{}' is not between 1 and {}", page_size_str, DEFAULT_PAGE_SIZE),
                )
            })?;

        let timeout_str = var_or("HTTP_TIMEOUT_SECS", "10");
        let http_timeout = timeout_str
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue("HTTP_TIMEOUT_SECS".to_string(), e.to_string()))?;

        Ok(Self {
            bind_address,
            log_level,
            public_url,
            client_name,
            client_id,
            redirect_uris,
            scope,
            handle_resolver,
            authorization_server,
            pds_url,
            session_file,
            collection,
            page_size,
            http_timeout,
        })
    }

    /// The client metadata document this deployment publishes.
    pub fn client_metadata(&self) -> ClientMetadata {
        ClientMetadata::new(
            self.client_id.clone(),
            self.client_name.clone(),
            self.public_url.clone(),
            self.redirect_uris.clone(),
            self.scope.clone(),
        )
    }

    pub fn authorization_config(&self) -> Result<AuthorizationConfig, ConfigError> {
        AuthorizationConfig::new(self.client_metadata(), self.handle_resolver.clone())
            .map_err(|e| ConfigError::InvalidValue("OAUTH_SCOPE".to_string(), e.to_string()))
    }
}

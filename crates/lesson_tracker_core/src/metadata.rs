//! crates/lesson_tracker_core/src/metadata.rs
//!
//! The application's identity as declared to the authorization server.
//!
//! `ClientMetadata` serializes to the client metadata document served at the
//! `client_id` URL. Field names and fixed values are part of the interoperability
//! contract with the authorization server and must not drift.

use serde::{Deserialize, Serialize};

/// Scope requested when none is configured.
pub const DEFAULT_SCOPE: &str = "atproto transition:generic";

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("client_id must not be empty")]
    MissingClientId,
    #[error("at least one redirect URI is required")]
    NoRedirectUris,
    #[error("scope '{0}' does not request 'atproto'")]
    MissingAtprotoScope(String),
}

/// The client metadata document for a public web client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub client_id: String,
    pub client_name: String,
    pub client_uri: String,
    pub redirect_uris: Vec<String>,
    pub scope: String,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub application_type: String,
    pub dpop_bound_access_tokens: bool,
}

impl ClientMetadata {
    /// Builds the metadata with the fixed grant, response and auth-method values.
    pub fn new(
        client_id: impl Into<String>,
        client_name: impl Into<String>,
        client_uri: impl Into<String>,
        redirect_uris: Vec<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_name: client_name.into(),
            client_uri: client_uri.into(),
            redirect_uris,
            scope: scope.into(),
            grant_types: vec![
                GRANT_AUTHORIZATION_CODE.to_string(),
                GRANT_REFRESH_TOKEN.to_string(),
            ],
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: "none".to_string(),
            application_type: "web".to_string(),
            dpop_bound_access_tokens: true,
        }
    }
}

/// Everything the authorization adapter is configured with, once per process.
#[derive(Debug, Clone)]
pub struct AuthorizationConfig {
    metadata: ClientMetadata,
    handle_resolver: String,
}

impl AuthorizationConfig {
    pub fn new(
        metadata: ClientMetadata,
        handle_resolver: impl Into<String>,
    ) -> Result<Self, MetadataError> {
        if metadata.client_id.trim().is_empty() {
            return Err(MetadataError::MissingClientId);
        }
        if metadata.redirect_uris.is_empty() {
            return Err(MetadataError::NoRedirectUris);
        }
        if !metadata.scope.split_whitespace().any(|s| s == "atproto") {
            return Err(MetadataError::MissingAtprotoScope(metadata.scope.clone()));
        }
        Ok(Self {
            metadata,
            handle_resolver: handle_resolver.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn metadata(&self) -> &ClientMetadata {
        &self.metadata
    }

    /// Base URL of the service resolving handles to DIDs.
    pub fn handle_resolver(&self) -> &str {
        &self.handle_resolver
    }

    /// The redirect target used for new authorization requests.
    pub fn redirect_uri(&self) -> &str {
        // Non-empty, checked in `new`.
        self.metadata
            .redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ClientMetadata {
        ClientMetadata::new(
            "https://lessons.example/client-metadata.json",
            "Piano Lesson Tracker",
            "https://lessons.example",
            vec!["https://lessons.example/oauth/callback".to_string()],
            DEFAULT_SCOPE,
        )
    }

    #[test]
    fn metadata_document_has_exact_fields() {
        let json = serde_json::to_value(metadata()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "client_id": "https://lessons.example/client-metadata.json",
                "client_name": "Piano Lesson Tracker",
                "client_uri": "https://lessons.example",
                "redirect_uris": ["https://lessons.example/oauth/callback"],
                "scope": "atproto transition:generic",
                "grant_types": ["authorization_code", "refresh_token"],
                "response_types": ["code"],
                "token_endpoint_auth_method": "none",
                "application_type": "web",
                "dpop_bound_access_tokens": true
            })
        );
    }

    #[test]
    fn config_validation() {
        let config = AuthorizationConfig::new(metadata(), "https://bsky.social/").unwrap();
        assert_eq!(config.handle_resolver(), "https://bsky.social");
        assert_eq!(config.redirect_uri(), "https://lessons.example/oauth/callback");

        let mut no_redirects = metadata();
        no_redirects.redirect_uris.clear();
        assert_eq!(
            AuthorizationConfig::new(no_redirects, "https://bsky.social").unwrap_err(),
            MetadataError::NoRedirectUris
        );

        let mut wrong_scope = metadata();
        wrong_scope.scope = "transition:generic".to_string();
        assert!(matches!(
            AuthorizationConfig::new(wrong_scope, "https://bsky.social"),
            Err(MetadataError::MissingAtprotoScope(_))
        ));
    }
}

//! services/api/src/adapters/oauth.rs
//!
//! This module contains the authorization adapter, the concrete implementation of
//! the `AuthorizationClient` port. It drives the redirect-based authorization code
//! flow with PKCE for a public client: it builds the authorization URL, hands it to
//! an `AuthorizationPrompt`, waits for the redirect callback, exchanges the code at
//! the token endpoint and persists the resulting session.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use lesson_tracker_core::metadata::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN};
use lesson_tracker_core::{
    AuthorizationClient, AuthorizationConfig, Did, PortError, PortResult, Session,
    SessionCredentials, SessionPersistence, SESSION_STORAGE_KEY,
};
use parking_lot::Mutex;
use rand::RngCore;
use reqwest::{Client, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::identity::HandleResolver;
use super::xrpc::{decode_error, transport_error};

/// PKCE code verifier length in bytes (before base64 encoding).
const PKCE_VERIFIER_LENGTH: usize = 32;

/// How long a sign-in waits for its redirect callback.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(600);

//=========================================================================================
// Prompting the User
//=========================================================================================

/// Shows the authorization URL to the user, e.g. by redirecting their browser.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn present(&self, authorization_url: &str) -> PortResult<()>;
}

/// Publishes authorization URLs to whoever is subscribed, usually the login handler.
#[derive(Clone)]
pub struct PromptChannel {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl PromptChannel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl Default for PromptChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorizationPrompt for PromptChannel {
    async fn present(&self, authorization_url: &str) -> PortResult<()> {
        self.tx.send_replace(Some(authorization_url.to_string()));
        info!("Authorization URL ready: {}", authorization_url);
        Ok(())
    }
}

//=========================================================================================
// PKCE
//=========================================================================================

/// PKCE challenge and verifier pair.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        let mut verifier_bytes = [0u8; PKCE_VERIFIER_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);
        let challenge = Self::challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// The S256 challenge for a verifier.
    pub fn challenge_for(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

//=========================================================================================
// Wire Structs
//=========================================================================================

/// The subset of the authorization server metadata this client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

#[derive(Deserialize, Default)]
struct TokenErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Query parameters of the redirect back to this application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub iss: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

struct PendingAuthorization {
    did: Did,
    handle: Option<String>,
    verifier: String,
    server: AuthorizationServerMetadata,
    responder: oneshot::Sender<PortResult<Session>>,
    created: Instant,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `AuthorizationClient` with the authorization code flow.
pub struct OAuthAdapter {
    config: AuthorizationConfig,
    issuer: String,
    service_endpoint: String,
    http: Client,
    resolver: HandleResolver,
    persistence: Arc<dyn SessionPersistence>,
    prompt: Arc<dyn AuthorizationPrompt>,
    pending: Mutex<HashMap<String, PendingAuthorization>>,
    pending_ttl: Duration,
}

impl OAuthAdapter {
    /// Creates a new `OAuthAdapter`.
    ///
    /// `issuer` is the authorization server; `service_endpoint` is the repository
    /// host recorded in the sessions this adapter produces.
    pub fn new(
        config: AuthorizationConfig,
        issuer: impl Into<String>,
        service_endpoint: impl Into<String>,
        http: Client,
        persistence: Arc<dyn SessionPersistence>,
        prompt: Arc<dyn AuthorizationPrompt>,
    ) -> Self {
        let resolver = HandleResolver::new(http.clone(), config.handle_resolver());
        Self {
            config,
            issuer: issuer.into().trim_end_matches('/').to_string(),
            service_endpoint: service_endpoint.into(),
            http,
            resolver,
            persistence,
            prompt,
            pending: Mutex::new(HashMap::new()),
            pending_ttl: DEFAULT_PENDING_TTL,
        }
    }

    /// Sets how long a sign-in waits for its callback before it is abandoned.
    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    /// Number of sign-ins waiting for their callback.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Handles the redirect callback and hands the outcome to the waiting sign-in.
    ///
    /// Returns the DID that was signed in.
    pub async fn complete(&self, params: CallbackParams) -> PortResult<Did> {
        let state = params
            .state
            .as_deref()
            .ok_or_else(|| PortError::InvalidResponse("callback is missing 'state'".to_string()))?;
        let pending = self
            .pending
            .lock()
            .remove(state)
            .filter(|p| p.created.elapsed() < self.pending_ttl)
            .ok_or_else(|| {
                PortError::NotFound(format!("no pending authorization for state '{}'", state))
            })?;
        let PendingAuthorization {
            did,
            handle,
            verifier,
            server,
            responder,
            ..
        } = pending;

        let outcome = self
            .finish(&did, handle, &verifier, &server, &params)
            .await;
        match outcome {
            Ok(session) => {
                let did = session.did.clone();
                if responder.send(Ok(session)).is_err() {
                    warn!(did = %did, "Sign-in was abandoned before its callback arrived.");
                }
                Ok(did)
            }
            Err(e) => {
                let message = e.to_string();
                let _ = responder.send(Err(e));
                Err(PortError::Unexpected(message))
            }
        }
    }

    async fn finish(
        &self,
        did: &Did,
        handle: Option<String>,
        verifier: &str,
        server: &AuthorizationServerMetadata,
        params: &CallbackParams,
    ) -> PortResult<Session> {
        if let Some(error) = &params.error {
            return Err(PortError::Rejected {
                status: 400,
                error: error.clone(),
                message: params.error_description.clone().unwrap_or_default(),
            });
        }
        if let Some(iss) = &params.iss {
            if iss.trim_end_matches('/') != server.issuer.trim_end_matches('/') {
                return Err(PortError::InvalidResponse(format!(
                    "callback issuer '{}' does not match '{}'",
                    iss, server.issuer
                )));
            }
        }
        let code = params
            .code
            .as_deref()
            .ok_or_else(|| PortError::InvalidResponse("callback is missing 'code'".to_string()))?;

        let metadata = self.config.metadata();
        let form = [
            ("grant_type", GRANT_AUTHORIZATION_CODE),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri()),
            ("client_id", metadata.client_id.as_str()),
            ("code_verifier", verifier),
        ];
        let token = self.request_token(&server.token_endpoint, &form).await?;
        self.session_from_token(did, handle, token)
    }

    async fn request_token(
        &self,
        token_endpoint: &str,
        form: &[(&str, &str)],
    ) -> PortResult<TokenResponse> {
        let response = self
            .http
            .post(token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body: TokenErrorBody = response.json().await.unwrap_or_default();
            return Err(PortError::Rejected {
                status: status.as_u16(),
                error: body.error.unwrap_or_else(|| "token_request_failed".to_string()),
                message: body.error_description.unwrap_or_default(),
            });
        }
        response.json().await.map_err(decode_error)
    }

    fn session_from_token(
        &self,
        expected: &Did,
        handle: Option<String>,
        token: TokenResponse,
    ) -> PortResult<Session> {
        if let Some(sub) = &token.sub {
            if sub != expected.as_str() {
                return Err(PortError::InvalidResponse(format!(
                    "token subject '{}' does not match '{}'",
                    sub, expected
                )));
            }
        }
        let expires_at = token
            .expires_in
            .map(|seconds| Utc::now() + chrono::Duration::seconds(seconds));
        Ok(Session::new(
            expected.clone(),
            handle,
            SessionCredentials {
                service_endpoint: self.service_endpoint.clone(),
                access_token: token.access_token,
                token_type: token.token_type,
                refresh_token: token.refresh_token,
                expires_at,
                scope: token.scope,
            },
        ))
    }

    async fn server_metadata(&self) -> PortResult<AuthorizationServerMetadata> {
        let response = self
            .http
            .get(format!(
                "{}/.well-known/oauth-authorization-server",
                self.issuer
            ))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Rejected {
                status: status.as_u16(),
                error: "server_metadata_unavailable".to_string(),
                message: format!("authorization server {} has no metadata", self.issuer),
            });
        }
        response.json().await.map_err(decode_error)
    }

    fn authorization_url(
        &self,
        server: &AuthorizationServerMetadata,
        state: &str,
        challenge: &str,
        login_hint: &str,
    ) -> PortResult<Url> {
        let metadata = self.config.metadata();
        Url::parse_with_params(
            &server.authorization_endpoint,
            &[
                ("client_id", metadata.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri()),
                ("response_type", "code"),
                ("scope", metadata.scope.as_str()),
                ("state", state),
                ("code_challenge", challenge),
                ("code_challenge_method", "S256"),
                ("login_hint", login_hint),
            ],
        )
        .map_err(|e| PortError::InvalidResponse(format!("bad authorization endpoint: {}", e)))
    }

    async fn refresh(&self, session: Session) -> PortResult<Option<Session>> {
        let Some(refresh_token) = session.credentials.refresh_token.clone() else {
            info!(did = %session.did, "Persisted session expired; discarding it.");
            self.persistence.remove(SESSION_STORAGE_KEY).await?;
            return Ok(None);
        };
        let server = self.server_metadata().await?;
        let form = [
            ("grant_type", GRANT_REFRESH_TOKEN),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.config.metadata().client_id.as_str()),
        ];
        let token = self.request_token(&server.token_endpoint, &form).await?;
        let mut refreshed = self.session_from_token(&session.did, session.handle, token)?;
        if refreshed.credentials.refresh_token.is_none() {
            refreshed.credentials.refresh_token = Some(refresh_token);
        }
        self.persistence
            .save(SESSION_STORAGE_KEY, &refreshed)
            .await?;
        info!(did = %refreshed.did, "Refreshed persisted session.");
        Ok(Some(refreshed))
    }
}

//=========================================================================================
// `AuthorizationClient` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthorizationClient for OAuthAdapter {
    async fn resume_session(&self) -> PortResult<Option<Session>> {
        let Some(session) = self.persistence.load(SESSION_STORAGE_KEY).await? else {
            return Ok(None);
        };
        if session.credentials.is_expired_at(Utc::now()) {
            return self.refresh(session).await;
        }
        debug!(did = %session.did, "Loaded persisted session.");
        Ok(Some(session))
    }

    async fn sign_in(&self, identifier_hint: &str) -> PortResult<Session> {
        let (did, handle) = self.resolver.resolve_hint(identifier_hint).await?;
        let server = self.server_metadata().await?;
        let pkce = PkceChallenge::generate();
        let state = Uuid::new_v4().simple().to_string();
        let url = self.authorization_url(&server, &state, &pkce.challenge, identifier_hint.trim())?;

        let (responder, outcome) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            let ttl = self.pending_ttl;
            pending.retain(|_, p| p.created.elapsed() < ttl);
            pending.insert(
                state.clone(),
                PendingAuthorization {
                    did: did.clone(),
                    handle,
                    verifier: pkce.verifier,
                    server,
                    responder,
                    created: Instant::now(),
                },
            );
        }

        if let Err(e) = self.prompt.present(url.as_str()).await {
            self.pending.lock().remove(&state);
            return Err(e);
        }
        info!(did = %did, "Waiting for the authorization callback.");

        let session = match tokio::time::timeout(self.pending_ttl, outcome).await {
            Ok(received) => received
                .map_err(|_| PortError::Unexpected("authorization was abandoned".to_string()))??,
            Err(_) => {
                self.pending.lock().remove(&state);
                warn!(did = %did, "No authorization callback arrived in time.");
                return Err(PortError::Unexpected(
                    "authorization timed out waiting for the callback".to_string(),
                ));
            }
        };
        self.persistence.save(SESSION_STORAGE_KEY, &session).await?;
        Ok(session)
    }
}

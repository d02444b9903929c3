//! services/api/src/adapters/identity.rs
//!
//! Resolves human-readable handles to owner DIDs through the configured
//! identity-resolution service.

use lesson_tracker_core::{Did, PortError, PortResult};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::xrpc::{check_status, decode_error, transport_error};

#[derive(Deserialize)]
struct ResolveHandleOutput {
    did: String,
}

#[derive(Clone)]
pub struct HandleResolver {
    http: Client,
    base_url: String,
}

impl HandleResolver {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Turns a sign-in hint into a DID plus the handle it was resolved from.
    ///
    /// A hint that already is a DID is used as-is and carries no handle.
    pub async fn resolve_hint(&self, hint: &str) -> PortResult<(Did, Option<String>)> {
        let hint = hint.trim();
        if hint.starts_with("did:") {
            let did = Did::new(hint).map_err(|e| PortError::InvalidResponse(e.to_string()))?;
            return Ok((did, None));
        }
        let handle = hint.trim_start_matches('@').to_ascii_lowercase();
        if handle.is_empty() || !handle.contains('.') {
            return Err(PortError::NotFound(format!("'{}' is not a valid handle", hint)));
        }
        let did = self.resolve(&handle).await?;
        Ok((did, Some(handle)))
    }

    pub async fn resolve(&self, handle: &str) -> PortResult<Did> {
        let response = self
            .http
            .get(format!(
                "{}/xrpc/com.atproto.identity.resolveHandle",
                self.base_url
            ))
            .query(&[("handle", handle)])
            .send()
            .await
            .map_err(transport_error)?;
        let output: ResolveHandleOutput = check_status(response)
            .await?
            .json()
            .await
            .map_err(decode_error)?;
        let did = Did::new(output.did).map_err(|e| PortError::InvalidResponse(e.to_string()))?;
        debug!(handle, did = %did, "Resolved handle.");
        Ok(did)
    }
}

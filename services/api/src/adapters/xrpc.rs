//! services/api/src/adapters/xrpc.rs
//!
//! This module contains the repository adapter, which is the concrete implementation
//! of the `RepositoryApi` port from the `core` crate. It talks to the session's
//! repository host over XRPC (`com.atproto.repo.*`) using `reqwest`.

use async_trait::async_trait;
use lesson_tracker_core::{
    Did, ListedRecord, PortError, PortResult, RecordRef, RepositoryApi, Session,
};
use reqwest::{header::AUTHORIZATION, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `RepositoryApi` port against an XRPC endpoint.
#[derive(Clone)]
pub struct XrpcRepositoryAdapter {
    http: Client,
}

impl XrpcRepositoryAdapter {
    /// Creates a new `XrpcRepositoryAdapter`.
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    fn endpoint(session: &Session, method: &str) -> String {
        format!(
            "{}/xrpc/{}",
            session.credentials.service_endpoint.trim_end_matches('/'),
            method
        )
    }
}

//=========================================================================================
// XRPC Wire Structs
//=========================================================================================

#[derive(Serialize)]
struct CreateRecordInput<'a> {
    repo: &'a str,
    collection: &'a str,
    record: Value,
}

#[derive(Deserialize)]
struct CreateRecordOutput {
    uri: String,
    cid: String,
}

#[derive(Deserialize)]
struct ListRecordsOutput {
    records: Vec<ListRecordsEntry>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct ListRecordsEntry {
    uri: String,
    #[serde(default)]
    cid: Option<String>,
    value: Value,
}

#[derive(Serialize)]
struct DeleteRecordInput<'a> {
    repo: &'a str,
    collection: &'a str,
    rkey: &'a str,
}

#[derive(Deserialize, Default)]
struct XrpcErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub(crate) fn transport_error(e: reqwest::Error) -> PortError {
    PortError::Transport(e.to_string())
}

pub(crate) fn decode_error(e: reqwest::Error) -> PortError {
    PortError::InvalidResponse(e.to_string())
}

/// Passes successful responses through and turns XRPC error bodies into `PortError`s.
pub(crate) async fn check_status(response: Response) -> PortResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: XrpcErrorBody = response.json().await.unwrap_or_default();
    let error = body
        .error
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Error").to_string());
    let message = body.message.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
        StatusCode::NOT_FOUND => PortError::NotFound(format!("{}: {}", error, message)),
        _ => PortError::Rejected {
            status: status.as_u16(),
            error,
            message,
        },
    })
}

//=========================================================================================
// `RepositoryApi` Trait Implementation
//=========================================================================================

#[async_trait]
impl RepositoryApi for XrpcRepositoryAdapter {
    async fn create_record(
        &self,
        session: &Session,
        repo: &Did,
        collection: &str,
        record: Value,
    ) -> PortResult<RecordRef> {
        let input = CreateRecordInput {
            repo: repo.as_str(),
            collection,
            record,
        };
        let response = self
            .http
            .post(Self::endpoint(session, "com.atproto.repo.createRecord"))
            .header(AUTHORIZATION, session.credentials.authorization_header())
            .json(&input)
            .send()
            .await
            .map_err(transport_error)?;
        let output: CreateRecordOutput = check_status(response)
            .await?
            .json()
            .await
            .map_err(decode_error)?;
        Ok(RecordRef {
            uri: output.uri,
            cid: output.cid,
        })
    }

    async fn list_records(
        &self,
        session: &Session,
        repo: &Did,
        collection: &str,
        limit: u32,
    ) -> PortResult<Vec<ListedRecord>> {
        let limit = limit.to_string();
        let response = self
            .http
            .get(Self::endpoint(session, "com.atproto.repo.listRecords"))
            .header(AUTHORIZATION, session.credentials.authorization_header())
            .query(&[
                ("repo", repo.as_str()),
                ("collection", collection),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        let output: ListRecordsOutput = check_status(response)
            .await?
            .json()
            .await
            .map_err(decode_error)?;

        if output.cursor.is_some() {
            debug!(repo = %repo, collection, "More records exist beyond the first page.");
        }
        Ok(output
            .records
            .into_iter()
            .map(|entry| ListedRecord {
                uri: entry.uri,
                cid: entry.cid,
                value: entry.value,
            })
            .collect())
    }

    async fn delete_record(
        &self,
        session: &Session,
        repo: &Did,
        collection: &str,
        rkey: &str,
    ) -> PortResult<()> {
        let input = DeleteRecordInput {
            repo: repo.as_str(),
            collection,
            rkey,
        };
        let response = self
            .http
            .post(Self::endpoint(session, "com.atproto.repo.deleteRecord"))
            .header(AUTHORIZATION, session.credentials.authorization_header())
            .json(&input)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }
}

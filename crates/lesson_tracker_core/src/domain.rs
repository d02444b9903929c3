//! crates/lesson_tracker_core/src/domain.rs
//!
//! Defines the core data structures for the application: owner identities,
//! sessions, record addresses and the lesson record itself.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Collection namespace holding the application's lesson records.
pub const LESSON_COLLECTION: &str = "app.piano.user.lesson";

/// Scheme prefix of every record locator.
pub const AT_URI_SCHEME: &str = "at://";

//=========================================================================================
// Parse Errors
//=========================================================================================

/// Errors raised when a string cannot be turned into one of the domain types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid DID: '{0}'")]
    InvalidDid(String),
    #[error("Invalid collection namespace: '{0}'")]
    InvalidNamespace(String),
    #[error("Invalid record locator: '{0}'")]
    InvalidLocator(String),
}

//=========================================================================================
// Owner Identity
//=========================================================================================

/// A stable, server-issued identifier for a user's data repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let mut parts = value.splitn(3, ':');
        let valid = parts.next() == Some("did")
            && parts.next().is_some_and(|method| {
                !method.is_empty()
                    && method
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            })
            && parts.next().is_some_and(|id| !id.is_empty() && !id.contains('/'));
        if valid {
            Ok(Self(value))
        } else {
            Err(DomainError::InvalidDid(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Did {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

//=========================================================================================
// Session
//=========================================================================================

/// An authorized binding between this application and one repository owner.
///
/// Sessions are never mutated in place; a new sign-in replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub did: Did,
    pub handle: Option<String>,
    pub credentials: SessionCredentials,
}

impl Session {
    pub fn new(did: Did, handle: Option<String>, credentials: SessionCredentials) -> Self {
        Self {
            did,
            handle,
            credentials,
        }
    }
}

/// Token material for a session. Only the adapters read these fields.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCredentials {
    /// Base URL of the repository host the tokens are valid for.
    pub service_endpoint: String,
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl SessionCredentials {
    /// Value for the `Authorization` header, e.g. `DPoP <token>`.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

// Tokens stay out of logs.
impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("service_endpoint", &self.service_endpoint)
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

//=========================================================================================
// Record Addressing
//=========================================================================================

/// Checks that a collection namespace looks like `tld.domain.name`.
pub fn validate_namespace(namespace: &str) -> Result<(), DomainError> {
    let segments: Vec<&str> = namespace.split('.').collect();
    let valid = segments.len() >= 3
        && segments.iter().all(|s| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if valid {
        Ok(())
    } else {
        Err(DomainError::InvalidNamespace(namespace.to_string()))
    }
}

/// Returns the record key of a locator: the final `/`-delimited segment.
///
/// A bare record key has no `/` and is returned unchanged.
pub fn record_key_of(locator: &str) -> &str {
    locator.rsplit('/').next().unwrap_or(locator)
}

/// The full address of one stored record: `at://<owner>/<collection>/<rkey>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordUri {
    authority: String,
    collection: String,
    rkey: String,
}

impl RecordUri {
    pub fn new(owner: &Did, collection: &str, rkey: &str) -> Self {
        Self {
            authority: owner.as_str().to_string(),
            collection: collection.to_string(),
            rkey: rkey.to_string(),
        }
    }

    /// Parses a locator returned by the repository.
    pub fn parse(locator: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::InvalidLocator(locator.to_string());
        let path = locator.strip_prefix(AT_URI_SCHEME).ok_or_else(invalid)?;
        let mut segments = path.split('/');
        match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(authority), Some(collection), Some(rkey), None)
                if !authority.is_empty() && !collection.is_empty() && !rkey.is_empty() =>
            {
                Ok(Self {
                    authority: authority.to_string(),
                    collection: collection.to_string(),
                    rkey: rkey.to_string(),
                })
            }
            _ => Err(invalid()),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn rkey(&self) -> &str {
        &self.rkey
    }
}

impl fmt::Display for RecordUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}/{}/{}",
            AT_URI_SCHEME, self.authority, self.collection, self.rkey
        )
    }
}

impl FromStr for RecordUri {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

//=========================================================================================
// Lesson Records
//=========================================================================================

/// The caller-supplied part of a lesson record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLesson {
    pub lesson_id: String,
    pub completed_at: String,
    pub score: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewLesson {
    pub fn new(lesson_id: impl Into<String>, completed_at: impl Into<String>, score: f64) -> Self {
        Self {
            lesson_id: lesson_id.into(),
            completed_at: completed_at.into(),
            score,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Rejects payloads the repository would store but the application could not read back.
    pub fn validate(&self) -> Result<(), String> {
        if self.lesson_id.trim().is_empty() {
            return Err("lessonId must not be empty".to_string());
        }
        if DateTime::parse_from_rfc3339(&self.completed_at).is_err() {
            return Err(format!(
                "completedAt '{}' is not an RFC 3339 timestamp",
                self.completed_at
            ));
        }
        if !self.score.is_finite() {
            return Err("score must be a finite number".to_string());
        }
        Ok(())
    }

    /// Stamps the payload with its namespace tag and creation time.
    pub fn into_record(self, collection: &str, created_at: String) -> LessonRecord {
        LessonRecord {
            record_type: collection.to_string(),
            lesson_id: self.lesson_id,
            completed_at: self.completed_at,
            score: self.score,
            notes: self.notes,
            created_at,
        }
    }
}

/// A lesson record as it is stored in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRecord {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub lesson_id: String,
    pub completed_at: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
}

impl LessonRecord {
    /// Checks a record read back from the repository against its collection.
    pub fn validate(&self, collection: &str) -> Result<(), String> {
        if self.record_type != collection {
            return Err(format!(
                "$type '{}' does not match collection '{}'",
                self.record_type, collection
            ));
        }
        if self.lesson_id.is_empty() {
            return Err("lessonId is empty".to_string());
        }
        Ok(())
    }
}

/// A lesson record together with its address, as returned by a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLesson {
    pub uri: RecordUri,
    pub cid: Option<String>,
    pub value: LessonRecord,
}

impl StoredLesson {
    pub fn rkey(&self) -> &str {
        self.uri.rkey()
    }
}

/// The address and content identifier of a newly written record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRecord {
    pub uri: RecordUri,
    pub cid: String,
}

/// Current time in the interchange format used for `createdAt`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_key_is_last_locator_segment() {
        let locator = "at://did123/app.piano.user.lesson/abc789";
        assert_eq!(record_key_of(locator), "abc789");
        assert_eq!(record_key_of(record_key_of(locator)), "abc789");
        assert_eq!(record_key_of("abc789"), "abc789");
    }

    #[test]
    fn record_uri_parses_and_renders() {
        let uri = RecordUri::parse("at://did:plc:xyz/app.piano.user.lesson/3kabc").unwrap();
        assert_eq!(uri.authority(), "did:plc:xyz");
        assert_eq!(uri.collection(), LESSON_COLLECTION);
        assert_eq!(uri.rkey(), "3kabc");
        assert_eq!(uri.to_string(), "at://did:plc:xyz/app.piano.user.lesson/3kabc");

        let did = Did::new("did:plc:xyz").unwrap();
        assert_eq!(RecordUri::new(&did, LESSON_COLLECTION, "3kabc"), uri);
    }

    #[test]
    fn record_uri_rejects_malformed_locators() {
        for bad in [
            "did:plc:xyz/app.piano.user.lesson/3kabc",
            "at://did:plc:xyz/app.piano.user.lesson",
            "at://did:plc:xyz/app.piano.user.lesson/",
            "at://did:plc:xyz/app.piano.user.lesson/a/b",
        ] {
            assert!(RecordUri::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn did_validation() {
        assert!(Did::new("did:plc:xyz").is_ok());
        assert!(Did::new("did:web:example.com").is_ok());
        assert!(Did::new("did123").is_err());
        assert!(Did::new("did::xyz").is_err());
        assert!(Did::new("did:plc:").is_err());
        assert!(serde_json::from_str::<Did>("\"nope\"").is_err());
    }

    #[test]
    fn namespace_validation() {
        assert!(validate_namespace(LESSON_COLLECTION).is_ok());
        assert!(validate_namespace("app.lesson").is_err());
        assert!(validate_namespace("app..lesson").is_err());
    }

    #[test]
    fn lesson_record_wire_format() {
        let record = NewLesson::new("lesson-1", "2024-01-01T00:00:00Z", 87.0)
            .into_record(LESSON_COLLECTION, "2024-01-02T00:00:00.000Z".to_string());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "$type": "app.piano.user.lesson",
                "lessonId": "lesson-1",
                "completedAt": "2024-01-01T00:00:00Z",
                "score": 87.0,
                "createdAt": "2024-01-02T00:00:00.000Z"
            })
        );
        let back: LessonRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
        assert!(back.validate(LESSON_COLLECTION).is_ok());
        assert!(back.validate("app.other.thing").is_err());
    }

    #[test]
    fn new_lesson_validation() {
        assert!(NewLesson::new("lesson-1", "2024-01-01T00:00:00Z", 87.0).validate().is_ok());
        assert!(NewLesson::new(" ", "2024-01-01T00:00:00Z", 87.0).validate().is_err());
        assert!(NewLesson::new("lesson-1", "yesterday", 87.0).validate().is_err());
        assert!(NewLesson::new("lesson-1", "2024-01-01T00:00:00Z", f64::NAN).validate().is_err());
    }

    #[test]
    fn credentials_debug_hides_tokens() {
        let credentials = SessionCredentials {
            service_endpoint: "https://pds.example".to_string(),
            access_token: "secret-access".to_string(),
            token_type: "DPoP".to_string(),
            refresh_token: Some("secret-refresh".to_string()),
            expires_at: None,
            scope: None,
        };
        let rendered = format!("{:?}", credentials);
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert_eq!(credentials.authorization_header(), "DPoP secret-access");
    }

    #[test]
    fn timestamp_now_is_rfc3339_utc() {
        let stamp = timestamp_now();
        assert!(stamp.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&stamp).is_ok());
    }
}

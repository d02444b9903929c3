//! Tests for the file-backed session persistence.

use chrono::{TimeZone, Utc};
use lesson_api::adapters::FileSessionPersistence;
use lesson_tracker_core::{
    Did, PortError, Session, SessionCredentials, SessionPersistence, SESSION_STORAGE_KEY,
};

fn session(did: &str) -> Session {
    Session::new(
        Did::new(did).unwrap(),
        Some("player.example.social".to_string()),
        SessionCredentials {
            service_endpoint: "https://pds.example".to_string(),
            access_token: "access".to_string(),
            token_type: "DPoP".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
            scope: Some("atproto transition:generic".to_string()),
        },
    )
}

#[tokio::test]
async fn test_save_then_load_survives_a_new_instance() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("session.json");

    let store = FileSessionPersistence::new(&path);
    store
        .save(SESSION_STORAGE_KEY, &session("did:plc:alice"))
        .await
        .unwrap();

    let reopened = FileSessionPersistence::new(&path);
    let loaded = reopened.load(SESSION_STORAGE_KEY).await.unwrap();
    assert_eq!(loaded, Some(session("did:plc:alice")));
}

#[tokio::test]
async fn test_load_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSessionPersistence::new(dir.path().join("absent.json"));
    assert_eq!(store.load(SESSION_STORAGE_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn test_remove_reports_presence_and_deletes_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let store = FileSessionPersistence::new(&path);

    assert!(!store.remove(SESSION_STORAGE_KEY).await.unwrap());

    store
        .save(SESSION_STORAGE_KEY, &session("did:plc:alice"))
        .await
        .unwrap();
    assert!(path.exists());
    assert!(store.remove(SESSION_STORAGE_KEY).await.unwrap());
    assert!(!path.exists());
    assert_eq!(store.load(SESSION_STORAGE_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn test_keys_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let store = FileSessionPersistence::new(&path);

    store.save("a", &session("did:plc:alice")).await.unwrap();
    store.save("b", &session("did:plc:bob")).await.unwrap();
    assert!(store.remove("a").await.unwrap());

    assert_eq!(store.load("a").await.unwrap(), None);
    assert_eq!(store.load("b").await.unwrap(), Some(session("did:plc:bob")));
    assert!(path.exists());
}

#[tokio::test]
async fn test_corrupt_file_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, b"{not json").unwrap();

    let store = FileSessionPersistence::new(&path);
    let err = store.load(SESSION_STORAGE_KEY).await.unwrap_err();
    assert!(matches!(err, PortError::Storage(_)));
}

#[tokio::test]
async fn test_remove_purges_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, b"{\"lesson_tracker.session\": {\"access_token\": \"leak").unwrap();

    let store = FileSessionPersistence::new(&path);
    assert!(store.remove(SESSION_STORAGE_KEY).await.unwrap());
    assert!(!path.exists());
    assert_eq!(store.load(SESSION_STORAGE_KEY).await.unwrap(), None);
}

#[cfg(unix)]
#[tokio::test]
async fn test_session_file_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let store = FileSessionPersistence::new(&path);
    store
        .save(SESSION_STORAGE_KEY, &session("did:plc:alice"))
        .await
        .unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

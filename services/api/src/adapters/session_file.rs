//! services/api/src/adapters/session_file.rs
//!
//! A `SessionPersistence` implementation that keeps sessions in a single JSON file,
//! so that a signed-in user survives a restart of the service.

use async_trait::async_trait;
use lesson_tracker_core::{PortError, PortResult, Session, SessionPersistence};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

type SessionMap = BTreeMap<String, Session>;

pub struct FileSessionPersistence {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file.
    lock: Mutex<()>,
}

impl FileSessionPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> PortResult<SessionMap> {
        self.try_read_map().await?.map_err(|e| {
            PortError::Storage(format!(
                "session file {} is corrupt: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Reads the file; the inner error is a decode failure of its contents.
    async fn try_read_map(&self) -> PortResult<Result<SessionMap, serde_json::Error>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Ok(SessionMap::new())),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Ok(SessionMap::new())),
            Err(e) => Err(storage_error(&self.path, e)),
        }
    }

    async fn write_map(&self, map: &SessionMap) -> PortResult<()> {
        if map.is_empty() {
            return match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(storage_error(&self.path, e)),
            };
        }

        let bytes = serde_json::to_vec_pretty(map)
            .map_err(|e| PortError::Storage(format!("failed to encode sessions: {}", e)))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(parent, e))?;
        }

        // Write to a sibling file first so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| storage_error(&tmp, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| storage_error(&tmp, e))?;
        }
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| storage_error(&self.path, e))
    }
}

fn storage_error(path: &Path, e: std::io::Error) -> PortError {
    PortError::Storage(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl SessionPersistence for FileSessionPersistence {
    async fn load(&self, key: &str) -> PortResult<Option<Session>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.remove(key))
    }

    async fn save(&self, key: &str, session: &Session) -> PortResult<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), session.clone());
        self.write_map(&map).await?;
        debug!(key, path = %self.path.display(), "Session saved.");
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<bool> {
        let _guard = self.lock.lock().await;
        let mut map = match self.try_read_map().await? {
            Ok(map) => map,
            Err(e) => {
                // Unreadable contents may still hold tokens; drop the whole file.
                warn!(path = %self.path.display(), "Session file is corrupt, deleting it: {}", e);
                self.write_map(&SessionMap::new()).await?;
                return Ok(true);
            }
        };
        if map.remove(key).is_none() {
            return Ok(false);
        }
        self.write_map(&map).await?;
        debug!(key, path = %self.path.display(), "Session removed.");
        Ok(true)
    }
}

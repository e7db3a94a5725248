//! Restart recovery: a tiny persisted record of "a session is recording".
//!
//! Only the session identity survives a restart. Steps captured before the
//! interruption are lost; the resumed session starts with an empty log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access state file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse state file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub recording: bool,
    #[serde(default)]
    pub session_id: String,
}

impl PersistedState {
    pub fn recording(session_id: impl Into<String>) -> Self {
        Self {
            recording: true,
            session_id: session_id.into(),
        }
    }
}

/// Storage slot written at start, cleared at stop, read once at launch.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError>;
    async fn save(&self, state: &PersistedState) -> Result<(), StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;
}

/// JSON file on disk.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.scribe/session.json`, or a relative fallback when there is no home.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".scribe"))
            .unwrap_or_else(|| PathBuf::from(".scribe"))
            .join("session.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string(state)?;
        tokio::fs::write(&self.path, json).await?;
        debug!("Persisted session state to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory slot for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStateStore {
    slot: Mutex<Option<PersistedState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self {
            slot: Mutex::new(Some(state)),
        }
    }

    pub async fn snapshot(&self) -> Option<PersistedState> {
        self.slot.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        Ok(self.slot.lock().await.clone())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        *self.slot.lock().await = Some(state.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.slot.lock().await = None;
        Ok(())
    }
}

/// Read the persisted slot and return the session id to resume, if any.
/// An unreadable slot is logged and treated as "nothing to resume".
pub async fn pending_session(store: &dyn StateStore) -> Option<String> {
    match store.load().await {
        Ok(Some(state)) if state.recording && !state.session_id.is_empty() => {
            Some(state.session_id)
        }
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to read persisted session state: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("nested").join("session.json"));

        assert_eq!(store.load().await.unwrap(), None);

        store.save(&PersistedState::recording("s-1")).await.unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, r#"{"recording":true,"sessionId":"s-1"}"#);
        assert_eq!(
            store.load().await.unwrap(),
            Some(PersistedState::recording("s-1"))
        );

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        // clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = FileStateStore::new(&path);
        assert!(matches!(store.load().await, Err(StoreError::Parse(_))));
        assert_eq!(pending_session(&store).await, None);
    }

    #[tokio::test]
    async fn test_pending_session_requires_recording_flag() {
        let store = MemoryStateStore::with_state(PersistedState {
            recording: false,
            session_id: "s-2".into(),
        });
        assert_eq!(pending_session(&store).await, None);

        store.save(&PersistedState::recording("")).await.unwrap();
        assert_eq!(pending_session(&store).await, None);

        store.save(&PersistedState::recording("s-3")).await.unwrap();
        assert_eq!(pending_session(&store).await.as_deref(), Some("s-3"));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::verification::{StageTransitionRecord, VerificationError, VerificationState, VerificationStore};

pub const SNAPSHOT_VERSION: &str = "1";

/// Errors that can occur while saving or loading a session snapshot
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("Invalid session state: {0}")]
    InvalidState(#[from] VerificationError),
}

/// Saved verification session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: String,
    pub session_id: String,
    pub saved_at: DateTime<Utc>,
    pub state: VerificationState,
    #[serde(default)]
    pub history: Vec<StageTransitionRecord>,
}

impl SessionSnapshot {
    pub fn capture(store: &VerificationStore, session_id: impl Into<String>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            session_id: session_id.into(),
            saved_at: Utc::now(),
            state: store.snapshot(),
            history: store.history().to_vec(),
        }
    }

    /// Rebuild a store holding the saved state and history
    pub fn restore(self) -> Result<VerificationStore, PersistenceError> {
        Ok(VerificationStore::from_parts(self.state, self.history)?)
    }
}

/// Reads and writes session snapshots as pretty JSON
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(snapshot)?;
        // Atomic replace
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &self.path).await?;

        info!(
            path = %self.path.display(),
            session_id = %snapshot.session_id,
            "Session snapshot saved"
        );
        Ok(())
    }

    pub async fn load(&self) -> Result<SessionSnapshot, PersistenceError> {
        let content = fs::read_to_string(&self.path).await?;
        let snapshot: SessionSnapshot = serde_json::from_str(&content)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: SNAPSHOT_VERSION.to_string(),
                found: snapshot.version,
            });
        }
        VerificationStore::check_parts(&snapshot.state, &snapshot.history)?;

        debug!(path = %self.path.display(), session_id = %snapshot.session_id, "Session snapshot loaded");
        Ok(snapshot)
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::{Agent, Stage};

    #[tokio::test]
    async fn test_save_and_load_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path().join("nested").join("session.json"));

        let mut store = VerificationStore::new();
        store.set_product_id("PART-001");
        store.update_agent_progress(Agent::Scan, 100);
        store.mark_scan_complete();
        store.set_current_step(Stage::Identity).unwrap();

        let snapshot = SessionSnapshot::capture(&store, "session-1");
        snapshots.save(&snapshot).await.unwrap();
        assert!(snapshots.exists().await);

        let loaded = snapshots.load().await.unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.history.len(), 1);

        let restored = loaded.restore().unwrap();
        assert_eq!(restored.snapshot(), store.snapshot());
        assert_eq!(restored.history(), store.history());
    }

    #[tokio::test]
    async fn test_version_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path().join("session.json"));

        let mut snapshot = SessionSnapshot::capture(&VerificationStore::new(), "old");
        snapshot.version = "0".to_string();
        snapshots.save(&snapshot).await.unwrap();

        assert!(matches!(
            snapshots.load().await,
            Err(PersistenceError::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path().join("absent.json"));

        assert!(!snapshots.exists().await);
        assert!(matches!(snapshots.load().await, Err(PersistenceError::IoError(_))));
    }

    #[tokio::test]
    async fn test_hand_edited_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path().join("session.json"));

        let snapshot = SessionSnapshot::capture(&VerificationStore::new(), "edited");
        let mut json = serde_json::to_value(&snapshot).unwrap();
        json["state"]["agents"]["scan"] = 250.into();
        tokio::fs::write(snapshots.path(), json.to_string()).await.unwrap();

        assert!(matches!(
            snapshots.load().await,
            Err(PersistenceError::InvalidState(VerificationError::ProgressOutOfRange {
                agent: Agent::Scan,
                progress: 250
            }))
        ));
    }

    #[tokio::test]
    async fn test_council_without_completed_flag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path().join("session.json"));

        let snapshot = SessionSnapshot::capture(&VerificationStore::new(), "edited");
        let mut json = serde_json::to_value(&snapshot).unwrap();
        json["state"]["current_step"] = "council".into();
        tokio::fs::write(snapshots.path(), json.to_string()).await.unwrap();

        let err = snapshots.load().await.unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::InvalidState(VerificationError::CompletedFlagMismatch {
                step: Stage::Council,
                completed: false
            })
        ));
    }
}

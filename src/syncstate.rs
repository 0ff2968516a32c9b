//! Bidirectional sync-state persistence (SPEC_FULL.md component C4).
//!
//! spec.md mandates a JSON document at `<root>/.syncnorris/state.json`
//! rather than the teacher's `rusqlite`-backed `bisync/state.rs`, so this
//! instead follows the atomic write-to-temp-then-rename pattern from the
//! teacher's `sync/resume.rs::ResumeState::save` — same durability
//! guarantee, simpler on-disk shape.

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const STATE_DIR_NAME: &str = ".syncnorris";
const STATE_FILE_NAME: &str = "state.json";

/// One remembered observation of a file, keyed by its normalized relative
/// path in [`SyncState::entries`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStateEntry {
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub hash: String,
    pub last_sync_time: DateTime<Utc>,
}

impl Default for SyncStateEntry {
    fn default() -> Self {
        Self {
            size: 0,
            mtime: DateTime::<Utc>::UNIX_EPOCH,
            hash: String::new(),
            last_sync_time: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl SyncStateEntry {
    pub fn with_last_sync(mut self, when: DateTime<Utc>) -> Self {
        self.last_sync_time = when;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    pub entries: HashMap<String, SyncStateEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    Created,
    Modified,
    Deleted,
    Unchanged,
}

/// Given the current hash for a path (`None` if the path no longer exists)
/// and its prior [`SyncStateEntry`], classifies the change per spec.md 4.4.
pub fn classify(prior: Option<&SyncStateEntry>, current_hash: Option<&str>) -> ChangeClass {
    match (prior, current_hash) {
        (None, _) => ChangeClass::Created,
        (Some(_), None) => ChangeClass::Deleted,
        (Some(entry), Some(hash)) if entry.hash != hash => ChangeClass::Modified,
        (Some(_), Some(_)) => ChangeClass::Unchanged,
    }
}

/// Loads and atomically persists the [`SyncState`] document for one sync
/// root. Not used at all in one-way or stateless bidirectional runs.
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(STATE_DIR_NAME).join(STATE_FILE_NAME),
        }
    }

    /// Missing file is an empty mapping, not an error (spec.md 4.4).
    pub async fn load(&self) -> Result<SyncState> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SyncState::default()),
            Err(e) => return Err(SyncError::Io(e)),
        };
        serde_json::from_slice(&data).map_err(|e| SyncError::StateCorrupt {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Write-to-temp-then-rename so a crash mid-write never corrupts the
    /// previous, still-valid state document.
    pub async fn save(&self, state: &SyncState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(SyncError::Io)?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(state).map_err(|e| SyncError::StateCorrupt {
            path: self.path.clone(),
            source: e,
        })?;
        tokio::fs::write(&temp_path, &body).await.map_err(SyncError::Io)?;
        tokio::fs::rename(&temp_path, &self.path).await.map_err(SyncError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_state_is_empty_mapping() {
        let dir = TempDir::new().unwrap();
        let store = SyncStateStore::new(dir.path());
        let state = store.load().await.unwrap();
        assert!(state.entries.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = SyncStateStore::new(dir.path());
        let mut state = SyncState::default();
        state.entries.insert(
            "a/b.txt".to_string(),
            SyncStateEntry {
                size: 10,
                mtime: Utc::now(),
                hash: "abc123".to_string(),
                last_sync_time: Utc::now(),
            },
        );
        store.save(&state).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.entries.get("a/b.txt").unwrap().hash, "abc123");
    }

    #[tokio::test]
    async fn corrupt_state_is_reported_not_silently_dropped() {
        let dir = TempDir::new().unwrap();
        let state_dir = dir.path().join(".syncnorris");
        tokio::fs::create_dir_all(&state_dir).await.unwrap();
        tokio::fs::write(state_dir.join("state.json"), b"not json").await.unwrap();
        let store = SyncStateStore::new(dir.path());
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, SyncError::StateCorrupt { .. }));
    }

    #[test]
    fn classify_no_prior_entry_is_created() {
        assert_eq!(classify(None, Some("h")), ChangeClass::Created);
    }

    #[test]
    fn classify_hash_match_is_unchanged() {
        let entry = SyncStateEntry { size: 1, mtime: Utc::now(), hash: "h".into(), last_sync_time: Utc::now() };
        assert_eq!(classify(Some(&entry), Some("h")), ChangeClass::Unchanged);
    }

    #[test]
    fn classify_hash_mismatch_is_modified() {
        let entry = SyncStateEntry { size: 1, mtime: Utc::now(), hash: "h1".into(), last_sync_time: Utc::now() };
        assert_eq!(classify(Some(&entry), Some("h2")), ChangeClass::Modified);
    }

    #[test]
    fn classify_missing_current_is_deleted() {
        let entry = SyncStateEntry { size: 1, mtime: Utc::now(), hash: "h".into(), last_sync_time: Utc::now() };
        assert_eq!(classify(Some(&entry), None), ChangeClass::Deleted);
    }
}

//! Durable local keyed store for mirrored ledger entries.
//!
//! This module provides the `LedgerDatabase`, a keyed table of [`LedgerEntry`]
//! records with upsert semantics. Records live in memory behind a `RwLock`
//! and are optionally snapshotted to disk after every mutation, so the mirror
//! survives process restarts. Batch writes hold the write lock for the whole
//! batch, so readers never observe a half-applied batch.

use crate::ledger::LedgerEntry;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// Error types for local store operations.
///
/// Storage failures propagate to the caller; the store itself never retries.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed table of ledger entries with whole-record replace semantics.
pub struct LedgerDatabase {
    entries: RwLock<HashMap<String, LedgerEntry>>,
    /// Serializes snapshot capture and disk write per mutation, so snapshots
    /// reach disk in the order they were taken.
    persist_lock: Mutex<()>,
    /// Snapshot file. `None` disables persistence.
    data_file: Option<PathBuf>,
    /// Sidecar with entry count and save time, next to the snapshot.
    meta_file: Option<PathBuf>,
}

impl LedgerDatabase {
    /// Open (or create) a database backed by a snapshot file in `data_dir`.
    ///
    /// An existing snapshot is loaded; a missing one yields an empty store.
    pub async fn open(data_dir: PathBuf) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&data_dir).await?;

        let data_file = data_dir.join("ledger_entries.json");
        let meta_file = data_dir.join("ledger_entries.meta.json");

        let mut entries = HashMap::new();
        if tokio::fs::try_exists(&data_file).await? {
            let content = tokio::fs::read_to_string(&data_file).await?;
            let stored: Vec<LedgerEntry> = serde_json::from_str(&content)?;
            info!("Loaded {} ledger entries from {:?}", stored.len(), data_file);
            for entry in stored {
                entries.insert(entry.key.clone(), entry);
            }
        }

        Ok(Self {
            entries: RwLock::new(entries),
            persist_lock: Mutex::new(()),
            data_file: Some(data_file),
            meta_file: Some(meta_file),
        })
    }

    /// Create a database with no backing file. Contents are lost on drop.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            persist_lock: Mutex::new(()),
            data_file: None,
            meta_file: None,
        }
    }

    /// Insert or fully replace the entry at `entry.key`.
    ///
    /// Stamps the current time when the entry has no timestamp. Returns the key.
    pub async fn upsert(&self, mut entry: LedgerEntry) -> Result<String, StorageError> {
        if entry.timestamp_ms.is_none() {
            entry.timestamp_ms = Some(now_ms());
        }

        let key = entry.key.clone();
        let _persist_guard = self.persist_lock.lock().await;
        let snapshot = {
            let mut entries = self.entries.write().await;
            entries.insert(key.clone(), entry);
            self.data_file.is_some().then(|| entries.values().cloned().collect())
        };
        self.persist(snapshot).await?;

        Ok(key)
    }

    /// Apply upsert semantics to a whole batch under one write lock.
    ///
    /// Concurrent readers see either none or all of the batch.
    pub async fn bulk_upsert(&self, batch: Vec<LedgerEntry>) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }

        let _persist_guard = self.persist_lock.lock().await;
        let snapshot = {
            let mut entries = self.entries.write().await;
            for mut entry in batch {
                if entry.timestamp_ms.is_none() {
                    entry.timestamp_ms = Some(now_ms());
                }
                entries.insert(entry.key.clone(), entry);
            }
            self.data_file.is_some().then(|| entries.values().cloned().collect())
        };
        self.persist(snapshot).await?;

        Ok(())
    }

    /// Return every stored entry. Order is unspecified; callers sort as needed.
    pub async fn get_all(&self) -> Vec<LedgerEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    /// Look up one entry by key.
    pub async fn get(&self, key: &str) -> Option<LedgerEntry> {
        self.entries.read().await.get(key).cloned()
    }

    /// Remove one entry. A missing key is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let _persist_guard = self.persist_lock.lock().await;
        let snapshot = {
            let mut entries = self.entries.write().await;
            entries.remove(key);
            self.data_file.is_some().then(|| entries.values().cloned().collect())
        };
        self.persist(snapshot).await
    }

    /// Remove all entries.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let _persist_guard = self.persist_lock.lock().await;
        let snapshot = {
            let mut entries = self.entries.write().await;
            entries.clear();
            self.data_file.is_some().then(Vec::new)
        };
        self.persist(snapshot).await
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Write the given snapshot to disk, if persistence is enabled.
    ///
    /// The snapshot goes through a temp file and a rename, so an interrupted
    /// write leaves the previous snapshot intact.
    async fn persist(&self, snapshot: Option<Vec<LedgerEntry>>) -> Result<(), StorageError> {
        let (Some(data_file), Some(meta_file), Some(snapshot)) =
            (&self.data_file, &self.meta_file, snapshot)
        else {
            return Ok(());
        };

        let content = serde_json::to_string(&snapshot)?;
        let tmp_file = data_file.with_extension("json.tmp");
        tokio::fs::write(&tmp_file, content).await?;
        tokio::fs::rename(&tmp_file, data_file).await?;

        let metadata = serde_json::json!({
            "entry_count": snapshot.len(),
            "saved_at": chrono::Utc::now().to_rfc3339(),
        });
        tokio::fs::write(meta_file, serde_json::to_string_pretty(&metadata)?).await?;

        Ok(())
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, label: &str) -> LedgerEntry {
        LedgerEntry {
            key: key.to_string(),
            label: label.to_string(),
            value: serde_json::json!({"amount": 1}),
            description: String::new(),
            timestamp_ms: Some(1_000),
            block_version: 1,
            block_size: 120,
            parent_block_hash: "0xparent".to_string(),
            block_offset: 0,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_whole_record() {
        let db = LedgerDatabase::in_memory();
        db.upsert(entry("a", "transfer")).await.unwrap();

        let mut replacement = entry("a", "registration");
        replacement.description = "updated".to_string();
        replacement.block_offset = 240;
        db.upsert(replacement.clone()).await.unwrap();

        let stored = db.get("a").await.unwrap();
        assert_eq!(stored, replacement);
        assert_eq!(db.len().await, 1);
    }

    #[tokio::test]
    async fn upsert_stamps_missing_timestamp() {
        let db = LedgerDatabase::in_memory();
        let mut e = entry("a", "");
        e.timestamp_ms = None;
        db.upsert(e).await.unwrap();

        let stored = db.get("a").await.unwrap();
        assert!(stored.timestamp_ms.is_some());
    }

    #[tokio::test]
    async fn delete_missing_key_is_noop() {
        let db = LedgerDatabase::in_memory();
        db.upsert(entry("a", "")).await.unwrap();
        db.delete("nope").await.unwrap();
        assert_eq!(db.len().await, 1);
        db.delete("a").await.unwrap();
        assert!(db.is_empty().await);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let db = LedgerDatabase::in_memory();
        db.bulk_upsert(vec![entry("a", ""), entry("b", "")])
            .await
            .unwrap();
        db.clear().await.unwrap();
        assert!(db.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();

        {
            let db = LedgerDatabase::open(path.clone()).await.unwrap();
            db.bulk_upsert(vec![entry("a", "transfer"), entry("b", "registration")])
                .await
                .unwrap();
        }

        let reopened = LedgerDatabase::open(path).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        assert_eq!(reopened.get("b").await.unwrap().label, "registration");
    }
}

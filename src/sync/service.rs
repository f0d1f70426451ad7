//! Ledger synchronization service.
//!
//! This module defines the `LedgerSyncService`, which drives the block
//! fetcher across the whole available chain in one call and materializes the
//! result in the local store. Collaborators (remote client, store) are
//! injected at construction; the application entry point owns the instance
//! and hands out references to whoever needs it.

use crate::ledger::{LedgerClient, LedgerEntry};
use crate::store::{LedgerDatabase, StorageError};
use crate::sync::fetcher::{BlockFetcher, ContinuePolicy, FetchOutcome};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Hard upper bound on blocks processed per run. Bounds worst-case run
    /// time against a remote source that never signals end of chain.
    pub max_blocks_per_sync: usize,
    /// How to handle a malformed entry inside an otherwise valid block.
    pub on_entry_error: ContinuePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_blocks_per_sync: 10_000,
            on_entry_error: ContinuePolicy::Stop,
        }
    }
}

/// Error types for sync operations.
///
/// Only initialization and storage failures abort a run; per-block fetch and
/// parse errors end the chain walk early but keep prior progress.
#[derive(Debug, thiserror::Error)]
pub enum LedgerSyncError {
    #[error("Ledger client initialization failed: {0}")]
    Initialization(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Orchestrates block fetch + normalize + store cycles against one client
/// and one local store.
pub struct LedgerSyncService {
    client: Arc<dyn LedgerClient>,
    fetcher: BlockFetcher,
    db: Arc<LedgerDatabase>,
    config: SyncConfig,
    /// Lazy one-time remote setup flag. Reset by [`disconnect`](Self::disconnect).
    initialized: Mutex<bool>,
}

impl LedgerSyncService {
    /// Create a sync service with the default configuration.
    pub fn new(client: Arc<dyn LedgerClient>, db: Arc<LedgerDatabase>) -> Self {
        Self::with_config(client, db, SyncConfig::default())
    }

    /// Create a sync service with an explicit configuration.
    pub fn with_config(
        client: Arc<dyn LedgerClient>,
        db: Arc<LedgerDatabase>,
        config: SyncConfig,
    ) -> Self {
        Self {
            fetcher: BlockFetcher::new(client.clone()),
            client,
            db,
            config,
            initialized: Mutex::new(false),
        }
    }

    /// Initialize the remote client once. Safe to retry after a failure.
    async fn ensure_initialized(&self) -> Result<(), LedgerSyncError> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }

        self.client
            .initialize()
            .await
            .map_err(|e| LedgerSyncError::Initialization(e.to_string()))?;
        *initialized = true;
        info!("Ledger client initialized");

        Ok(())
    }

    /// Walk the whole chain from offset 0, store everything found, and return
    /// this run's entries (not the whole store).
    ///
    /// Every call is a complete, idempotent resynchronization: the append-only
    /// chain is cheap to re-walk through its `jump_bytes_next` links, and a
    /// full rescan self-heals after any missed update. A per-offset fetch
    /// error ends the walk early; entries gathered before it are still stored.
    pub async fn fetch_and_store_latest(&self) -> Result<Vec<LedgerEntry>, LedgerSyncError> {
        self.ensure_initialized().await?;

        let mut batch: Vec<LedgerEntry> = Vec::new();
        let mut offset = 0u64;
        let mut blocks_processed = 0usize;

        while blocks_processed < self.config.max_blocks_per_sync {
            match self
                .fetcher
                .fetch_block(offset, self.config.on_entry_error)
                .await
            {
                Ok(FetchOutcome::Block(block)) => {
                    debug!(
                        "Fetched block at offset {}: {} entries, next offset {}",
                        offset,
                        block.entries.len(),
                        block.next_offset
                    );
                    batch.extend(block.entries);
                    blocks_processed += 1;

                    if block.chain_exhausted {
                        debug!("Chain exhausted at offset {} (jump_bytes_next == 0)", offset);
                        break;
                    }
                    offset = block.next_offset;
                }
                Ok(FetchOutcome::NoMoreBlocks) => {
                    debug!("No block found at offset {}", offset);
                    break;
                }
                Err(e) => {
                    // One bad offset must not abort a long sync: keep what was
                    // already normalized and stop advancing.
                    warn!("Reached end of blocks or error at offset {}: {}", offset, e);
                    break;
                }
            }
        }

        if blocks_processed >= self.config.max_blocks_per_sync {
            warn!(
                "Stopped sync after {} blocks (per-run ceiling)",
                blocks_processed
            );
        }

        if !batch.is_empty() {
            self.db.bulk_upsert(batch.clone()).await?;
        }

        info!(
            "Sync run complete: {} blocks, {} entries",
            blocks_processed,
            batch.len()
        );
        Ok(batch)
    }

    /// Return every entry from the local store.
    pub async fn get_all_entries(&self) -> Vec<LedgerEntry> {
        self.db.get_all().await
    }

    /// Look up one entry by key in the local store.
    pub async fn get_entry(&self, key: &str) -> Option<LedgerEntry> {
        self.db.get(key).await
    }

    /// Remove all locally mirrored entries.
    pub async fn clear_all_entries(&self) -> Result<(), LedgerSyncError> {
        self.db.clear().await?;
        Ok(())
    }

    /// Forget the initialized state. The next sync call re-initializes the
    /// remote client.
    pub async fn disconnect(&self) {
        let mut initialized = self.initialized.lock().await;
        *initialized = false;
    }

    /// The local store this service writes to.
    pub fn database(&self) -> &Arc<LedgerDatabase> {
        &self.db
    }
}

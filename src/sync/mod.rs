//! Ledger Synchronization Module
//!
//! This module provides the core logic for mirroring the remote ledger into
//! the local store. It is composed of several submodules, each responsible
//! for one aspect of the sync process:
//!
//! - `fetcher`: Fetches one block at a byte offset and flattens it into ledger entries.
//! - `service`: Walks the whole chain per run, batches entries, and writes them in one bulk upsert.
//! - `poller`: A cancellable recurring timer that keeps the mirror fresh.
//!
//! Data flows one way: remote client → fetcher → service → store. The poller
//! only drives the service on a schedule and never touches the store directly.

/// Block fetching and normalization into flat entries
pub mod fetcher;
/// Recurring background trigger for sync runs
pub mod poller;
/// Chain-walk orchestration and local materialization
pub mod service;

pub use fetcher::{BlockFetchError, BlockFetcher, ContinuePolicy, FetchOutcome, FetchedBlock};
pub use poller::{DEFAULT_POLL_INTERVAL, LedgerPoller, POLL_INTERVALS};
pub use service::{LedgerSyncError, LedgerSyncService, SyncConfig};

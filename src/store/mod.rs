//! Local persistence for the ledger mirror
//!
//! This module provides the durable keyed store that holds the flattened
//! ledger entries between sync runs. The store lives for the whole session
//! (or longer, since it is snapshotted to disk) until explicitly cleared.

/// Keyed entry store with snapshot-file persistence
mod db;

pub use db::{LedgerDatabase, StorageError};

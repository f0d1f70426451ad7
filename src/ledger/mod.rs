//! Remote ledger integration module for the Decent Cloud network
//!
//! This module provides the client and types for reading the append-only
//! block stream served by a Decent Cloud ledger node. Blocks are addressed by
//! byte offset and chained through each header's `jump_bytes_next` field.

/// HTTP client for reading blocks from a ledger node
mod client;
/// Type definitions for block data structures and mirrored entries
mod types;

pub use client::{DecentCloudLedgerClient, LedgerClient};
pub use types::*;

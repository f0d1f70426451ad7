//! Types for the remote ledger block API and the locally mirrored entries.

use serde::{Deserialize, Serialize};

/// One key/value fact inside a fetched block, as returned by the remote API.
///
/// `label` and `description` are optional on the wire and default to empty
/// strings so downstream code never has to distinguish "absent" from "empty".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEntry {
    /// Unique identifier of the fact within the ledger.
    pub key: String,
    /// Decoded payload. Opaque to the sync layer.
    pub value: serde_json::Value,
    /// Categorical tag describing the kind of fact.
    #[serde(default)]
    pub label: String,
    /// Human-readable annotation.
    #[serde(default)]
    pub description: String,
}

/// Metadata of one fetched block.
///
/// Only used to stamp [`LedgerEntry`] records and to compute the next fetch
/// offset; never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Format version of the block.
    pub block_version: u32,
    /// Byte length to the next block. Zero means the chain ends here.
    pub jump_bytes_next: u64,
    /// Hash of the preceding block. Audit/debug field, not verified locally.
    pub parent_block_hash: String,
    /// Byte offset of this block within the ledger stream.
    pub offset: u64,
    /// Block production time in nanoseconds since epoch.
    pub timestamp_ns: u64,
}

/// Inner shape of a block-read response.
///
/// Both fields are optional: a payload with either one missing means there is
/// no block at the requested offset.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockPayload {
    pub block: Option<Vec<serde_json::Value>>,
    pub block_header: Option<BlockHeader>,
}

/// Tagged shape of a block-read response.
///
/// The remote API sometimes wraps the payload one level deep in an `Ok`
/// success tag. Both shapes are accepted and normalized to [`BlockPayload`]
/// once, at the fetcher boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BlockResult {
    Wrapped {
        #[serde(rename = "Ok")]
        ok: BlockPayload,
    },
    Plain(BlockPayload),
}

impl BlockResult {
    /// Unwrap the optional success tag.
    pub fn into_payload(self) -> BlockPayload {
        match self {
            BlockResult::Wrapped { ok } => ok,
            BlockResult::Plain(payload) => payload,
        }
    }
}

/// One persisted ledger record: a block entry flattened with the metadata of
/// its containing block, so the local store can be queried without a join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Primary key of the local store.
    pub key: String,
    /// Categorical tag. Empty when the block entry carried none.
    pub label: String,
    /// Decoded payload, stored as-is.
    pub value: serde_json::Value,
    /// Human-readable annotation. May be empty.
    pub description: String,
    /// Block production time in milliseconds since epoch. The store stamps
    /// the current time on upsert when absent.
    pub timestamp_ms: Option<u64>,
    /// Format version of the containing block.
    pub block_version: u32,
    /// Byte length to the next block.
    pub block_size: u64,
    /// Hash of the preceding block.
    pub parent_block_hash: String,
    /// Byte offset of the containing block.
    pub block_offset: u64,
}

impl LedgerEntry {
    /// Flatten a block entry with its containing block's header.
    ///
    /// The header timestamp is converted from nanoseconds to milliseconds;
    /// everything downstream (formatting, sorting) assumes millisecond epoch.
    pub fn from_block_entry(entry: BlockEntry, header: &BlockHeader) -> Self {
        Self {
            key: entry.key,
            label: entry.label,
            value: entry.value,
            description: entry.description,
            timestamp_ms: Some(header.timestamp_ns / 1_000_000),
            block_version: header.block_version,
            block_size: header.jump_bytes_next,
            parent_block_hash: header.parent_block_hash.clone(),
            block_offset: header.offset,
        }
    }
}

/// Error types for remote ledger client operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerClientError {
    #[error("API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No data returned")]
    NoData,
}

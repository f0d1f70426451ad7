//! Block fetching and normalization.
//!
//! This module turns one remote block read into flat [`LedgerEntry`] records
//! plus the offset of the next block. It owns the defensive handling of the
//! remote response shape (`Ok`-wrapped or plain, object or JSON string) so
//! that the rest of the sync layer only ever sees one internal shape.

use crate::ledger::{BlockEntry, BlockResult, LedgerClient, LedgerClientError, LedgerEntry};
use std::sync::Arc;
use tracing::warn;

/// What to do when one entry inside an otherwise valid block fails to decode.
///
/// The block header is intact in this situation, so the walk can continue
/// either way; the policy only decides whether the bad entry ends the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuePolicy {
    /// Fail the block. The sync run keeps earlier progress and stops walking.
    Stop,
    /// Drop the malformed entry and keep the rest of the block.
    Skip,
}

/// Result of fetching one block offset.
#[derive(Debug)]
pub enum FetchOutcome {
    /// No block exists at the requested offset (end of chain, or a hole).
    NoMoreBlocks,
    /// A block was found and normalized.
    Block(FetchedBlock),
}

/// A normalized block: its flattened entries and how to reach the next block.
#[derive(Debug)]
pub struct FetchedBlock {
    /// One record per block entry, header fields denormalized onto each.
    pub entries: Vec<LedgerEntry>,
    /// Byte offset of the next block: `header.offset + header.jump_bytes_next`.
    pub next_offset: u64,
    /// True when `jump_bytes_next` was zero or the next offset would not fit
    /// in a `u64`. The chain ends here; there is no way to advance past this
    /// block.
    pub chain_exhausted: bool,
}

/// Error types for fetching and decoding one block.
#[derive(Debug, thiserror::Error)]
pub enum BlockFetchError {
    #[error("Ledger client error: {0}")]
    Client(#[from] LedgerClientError),

    #[error("Malformed block payload at offset {offset}: {source}")]
    MalformedPayload {
        offset: u64,
        source: serde_json::Error,
    },

    #[error("Malformed block entry at offset {offset}: {source}")]
    MalformedEntry {
        offset: u64,
        source: serde_json::Error,
    },
}

/// Fetches sequential blocks from a remote ledger client and flattens them.
#[derive(Clone)]
pub struct BlockFetcher {
    client: Arc<dyn LedgerClient>,
}

impl BlockFetcher {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self { client }
    }

    /// Fetch the block at `offset` and normalize it into ledger entries.
    ///
    /// Header timestamps are converted from nanoseconds to milliseconds here;
    /// every derived record carries millisecond epoch times.
    pub async fn fetch_block(
        &self,
        offset: u64,
        policy: ContinuePolicy,
    ) -> Result<FetchOutcome, BlockFetchError> {
        let raw = self.client.get_block(offset).await?;

        // The remote may return the payload object directly or a JSON string
        // encoding it.
        let raw = match raw {
            serde_json::Value::String(text) => serde_json::from_str(&text)
                .map_err(|source| BlockFetchError::MalformedPayload { offset, source })?,
            other => other,
        };

        let result: BlockResult = serde_json::from_value(raw)
            .map_err(|source| BlockFetchError::MalformedPayload { offset, source })?;
        let payload = result.into_payload();

        let (Some(block), Some(header)) = (payload.block, payload.block_header) else {
            return Ok(FetchOutcome::NoMoreBlocks);
        };

        let mut entries = Vec::with_capacity(block.len());
        for raw_entry in block {
            match serde_json::from_value::<BlockEntry>(raw_entry) {
                Ok(entry) => entries.push(LedgerEntry::from_block_entry(entry, &header)),
                Err(source) => match policy {
                    ContinuePolicy::Skip => {
                        warn!("Skipping malformed entry at offset {}: {}", offset, source);
                    }
                    ContinuePolicy::Stop => {
                        return Err(BlockFetchError::MalformedEntry { offset, source });
                    }
                },
            }
        }

        // A next offset past u64::MAX cannot be followed; the chain ends here.
        let (next_offset, chain_exhausted) =
            match header.offset.checked_add(header.jump_bytes_next) {
                Some(next) => (next, header.jump_bytes_next == 0),
                None => (header.offset, true),
            };

        Ok(FetchOutcome::Block(FetchedBlock {
            entries,
            next_offset,
            chain_exhausted,
        }))
    }
}

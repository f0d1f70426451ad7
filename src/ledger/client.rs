//!
//! HTTP client for the Decent Cloud ledger API.
//!
//! This module provides an async client for reading blocks from a remote
//! ledger node. The node serves the append-only block stream as JSON: one
//! endpoint for liveness/metadata and one for the block at a given byte
//! offset. All methods are async and designed for use with Tokio.

use super::types::LedgerClientError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Remote ledger access as required by the sync layer.
///
/// Implementations must make `initialize` idempotent: the sync service calls
/// it lazily and may call it again after a failure.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Perform one-time remote setup. Idempotent, may fail.
    async fn initialize(&self) -> Result<(), LedgerClientError>;

    /// Read the block at the given byte offset.
    ///
    /// Returns the raw response value. The response may be the payload object
    /// itself, an `Ok`-wrapped payload, or a JSON string encoding either;
    /// the fetcher normalizes all of these.
    async fn get_block(&self, offset: u64) -> Result<serde_json::Value, LedgerClientError>;
}

/// HTTP client for a Decent Cloud ledger node.
#[derive(Clone)]
pub struct DecentCloudLedgerClient {
    /// The underlying HTTP client.
    http_client: Client,
    /// Base URL of the ledger API, without trailing slash.
    base_url: String,
}

impl DecentCloudLedgerClient {
    /// Create a new ledger client for the given API base URL.
    pub fn new(base_url: String) -> Result<Self, LedgerClientError> {
        let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LedgerClient for DecentCloudLedgerClient {
    async fn initialize(&self) -> Result<(), LedgerClientError> {
        let url = format!("{}/api/v1/ledger/info", self.base_url);
        debug!("Initializing ledger client against {}", url);

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(LedgerClientError::Api(format!(
                "Ledger info request failed: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn get_block(&self, offset: u64) -> Result<serde_json::Value, LedgerClientError> {
        let url = format!("{}/api/v1/ledger/blocks/{}", self.base_url, offset);

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(LedgerClientError::Api(format!(
                "Block request at offset {} failed: HTTP {}",
                offset,
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        Ok(body)
    }
}

use dc_ledger_sync::ledger::DecentCloudLedgerClient;
use dc_ledger_sync::store::LedgerDatabase;
use dc_ledger_sync::sync::{DEFAULT_POLL_INTERVAL, LedgerPoller, LedgerSyncService};
use dc_ledger_sync::view::{LedgerQuery, distinct_labels, format_timestamp};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::time())
        .init();

    info!("Starting Decent Cloud ledger mirror");

    let api_url = std::env::var("DC_LEDGER_API_URL")
        .unwrap_or_else(|_| "https://ledger.decent-cloud.org".to_string());
    let data_dir = std::env::var("DC_LEDGER_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".dc-ledger"));
    let poll_interval = std::env::var("DC_LEDGER_POLL_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_POLL_INTERVAL);

    let client = match DecentCloudLedgerClient::new(api_url.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create ledger client: {}", e);
            return;
        }
    };
    info!("Created ledger client for {}", api_url);

    let db = match LedgerDatabase::open(data_dir.clone()).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open ledger database in {:?}: {}", data_dir, e);
            return;
        }
    };
    info!("Opened ledger database ({} entries)", db.len().await);

    let sync_service = Arc::new(LedgerSyncService::new(client, db.clone()));

    match sync_service.fetch_and_store_latest().await {
        Ok(fetched) => info!("Initial sync fetched {} entries", fetched.len()),
        Err(e) => {
            error!("Initial sync failed: {}", e);
            return;
        }
    }

    let entries = LedgerQuery::default().apply(db.get_all().await);
    info!("Mirror holds {} entries", entries.len());
    info!("Labels present: {:?}", distinct_labels(&entries));
    for entry in entries.iter().take(10) {
        info!(
            "{} [{}] at {} (block offset {})",
            entry.key,
            if entry.label.is_empty() { "N/A" } else { &entry.label },
            format_timestamp(entry.timestamp_ms),
            entry.block_offset
        );
    }

    let poller = LedgerPoller::new(sync_service);
    poller.start(poll_interval).await;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    poller.stop();
    info!("Shutting down");
}

//! Recurring background trigger for ledger synchronization.
//!
//! This module provides the `LedgerPoller`, a cancellable, reconfigurable
//! timer that invokes the sync service's fetch-all operation at a fixed
//! interval. The poller owns its own lifecycle; changing the frequency is an
//! explicit `stop()` + `start(new_interval)` by the caller.

use crate::sync::service::LedgerSyncService;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Preset poll intervals offered to callers.
pub const POLL_INTERVALS: [Duration; 4] = [
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(30),
    Duration::from_secs(60),
];

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Cancellable recurring driver of [`LedgerSyncService::fetch_and_store_latest`].
///
/// At most one timer is active per poller instance. A tick's fetch error is
/// logged and swallowed; polling never self-terminates.
pub struct LedgerPoller {
    sync_service: Arc<LedgerSyncService>,
    /// Stop signal for the currently running timer task, if any.
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl LedgerPoller {
    pub fn new(sync_service: Arc<LedgerSyncService>) -> Self {
        Self {
            sync_service,
            stop_tx: Mutex::new(None),
        }
    }

    /// Start polling at the given interval.
    ///
    /// Any previously running timer is stopped first, so two timers never
    /// overlap. One fetch runs immediately and is awaited before the timer is
    /// scheduled; if it fails, the error is logged and polling still starts.
    pub async fn start(&self, interval: Duration) {
        self.stop();

        if let Err(e) = self.sync_service.fetch_and_store_latest().await {
            error!("Initial fetch failed: {}", e);
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        {
            let mut guard = self.stop_tx.lock().unwrap();
            *guard = Some(stop_tx);
        }

        let sync_service = self.sync_service.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // The first tick of a tokio interval resolves immediately; the
            // immediate fetch already happened, so consume it.
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    _ = stop_rx.changed() => {
                        info!("Ledger polling stopped");
                        return;
                    }
                }

                // The fetch runs outside the select, so stop() cancels only
                // future ticks; an in-flight run completes and writes.
                if let Err(e) = sync_service.fetch_and_store_latest().await {
                    error!("Polling fetch failed: {}", e);
                }
            }
        });

        info!("Ledger polling started (every {:?})", interval);
    }

    /// Cancel future ticks. Idempotent; safe to call when not running. Does
    /// not wait for an in-flight tick to finish.
    pub fn stop(&self) {
        let mut guard = self.stop_tx.lock().unwrap();
        if let Some(stop_tx) = guard.take() {
            // The task may already have exited; nothing to do then.
            let _ = stop_tx.send(true);
        }
    }

    /// Whether a timer is currently scheduled.
    pub fn is_running(&self) -> bool {
        self.stop_tx.lock().unwrap().is_some()
    }
}

impl Drop for LedgerPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

//! End-to-end sync tests against an in-memory mock ledger client.

use async_trait::async_trait;
use dc_ledger_sync::ledger::{LedgerClient, LedgerClientError, LedgerEntry};
use dc_ledger_sync::store::LedgerDatabase;
use dc_ledger_sync::sync::{ContinuePolicy, LedgerPoller, LedgerSyncService, SyncConfig};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted ledger client: serves a fixed offset → payload map, or an endless
/// chain when `endless` is set.
struct MockLedgerClient {
    blocks: Mutex<HashMap<u64, Value>>,
    fail_init: bool,
    endless: bool,
    init_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MockLedgerClient {
    fn new(blocks: HashMap<u64, Value>) -> Self {
        Self {
            blocks: Mutex::new(blocks),
            fail_init: false,
            endless: false,
            init_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    fn failing_init() -> Self {
        let mut client = Self::new(HashMap::new());
        client.fail_init = true;
        client
    }

    fn endless() -> Self {
        let mut client = Self::new(HashMap::new());
        client.endless = true;
        client
    }

    fn set_block(&self, offset: u64, payload: Value) {
        self.blocks.lock().unwrap().insert(offset, payload);
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn initialize(&self) -> Result<(), LedgerClientError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(LedgerClientError::Api("node unreachable".to_string()));
        }
        Ok(())
    }

    async fn get_block(&self, offset: u64) -> Result<Value, LedgerClientError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.endless {
            let key = format!("k{offset}");
            return Ok(block(offset, 10, &[(key.as_str(), "endless")]));
        }
        self.blocks
            .lock()
            .unwrap()
            .get(&offset)
            .cloned()
            .ok_or(LedgerClientError::NoData)
    }
}

fn block(offset: u64, jump: u64, entries: &[(&str, &str)]) -> Value {
    let block: Vec<Value> = entries
        .iter()
        .map(|(key, label)| json!({"key": key, "value": {"n": 1}, "label": label}))
        .collect();
    json!({
        "block": block,
        "block_header": {
            "block_version": 1,
            "jump_bytes_next": jump,
            "parent_block_hash": format!("0x{offset}"),
            "offset": offset,
            "timestamp_ns": 10_000_000_000u64
        }
    })
}

fn two_block_chain() -> HashMap<u64, Value> {
    let mut blocks = HashMap::new();
    blocks.insert(0, block(0, 120, &[("a", "X"), ("b", "Y")]));
    // Wrapped in the success tag: both shapes must behave the same.
    blocks.insert(120, json!({"Ok": block(120, 0, &[("c", "X")])}));
    blocks
}

fn stored_entry(key: &str) -> LedgerEntry {
    LedgerEntry {
        key: key.to_string(),
        label: "transfer".to_string(),
        value: json!({"n": 1}),
        description: String::new(),
        timestamp_ms: Some(1_000),
        block_version: 1,
        block_size: 120,
        parent_block_hash: "0xparent".to_string(),
        block_offset: 0,
    }
}

fn service_with(client: Arc<MockLedgerClient>) -> (Arc<LedgerSyncService>, Arc<LedgerDatabase>) {
    let db = Arc::new(LedgerDatabase::in_memory());
    let service = Arc::new(LedgerSyncService::new(client, db.clone()));
    (service, db)
}

#[tokio::test]
async fn walks_the_chain_and_stores_every_entry() {
    let client = Arc::new(MockLedgerClient::new(two_block_chain()));
    let (service, db) = service_with(client.clone());

    let fetched = service.fetch_and_store_latest().await.unwrap();
    assert_eq!(fetched.len(), 3);

    let mut keys: Vec<String> = db.get_all().await.into_iter().map(|e| e.key).collect();
    keys.sort();
    assert_eq!(keys, ["a", "b", "c"]);

    // The walk stopped because jump_bytes_next == 0 at offset 120, not
    // because a lookup at the computed offset (120 + 0 = 120) failed.
    assert_eq!(client.fetch_calls.load(Ordering::SeqCst), 2);

    // Header fields are denormalized onto each entry, ns converted to ms.
    let a = db.get("a").await.unwrap();
    assert_eq!(a.timestamp_ms, Some(10_000));
    assert_eq!(a.block_size, 120);
    assert_eq!(a.block_offset, 0);
    let c = db.get("c").await.unwrap();
    assert_eq!(c.block_offset, 120);
    assert_eq!(c.block_size, 0);
}

#[tokio::test]
async fn resync_is_idempotent() {
    let client = Arc::new(MockLedgerClient::new(two_block_chain()));
    let (service, db) = service_with(client);

    service.fetch_and_store_latest().await.unwrap();
    let first: Vec<_> = {
        let mut all = db.get_all().await;
        all.sort_by(|x, y| x.key.cmp(&y.key));
        all
    };

    service.fetch_and_store_latest().await.unwrap();
    let second: Vec<_> = {
        let mut all = db.get_all().await;
        all.sort_by(|x, y| x.key.cmp(&y.key));
        all
    };

    assert_eq!(first, second);
}

#[tokio::test]
async fn resync_overwrites_changed_entries_in_place() {
    let client = Arc::new(MockLedgerClient::new(two_block_chain()));
    let (service, db) = service_with(client.clone());
    service.fetch_and_store_latest().await.unwrap();
    assert_eq!(db.get("a").await.unwrap().label, "X");

    client.set_block(0, block(0, 120, &[("a", "Z"), ("b", "Y")]));
    service.fetch_and_store_latest().await.unwrap();

    assert_eq!(db.get("a").await.unwrap().label, "Z");
    assert_eq!(db.len().await, 3);
}

#[tokio::test]
async fn terminates_at_the_block_ceiling() {
    let client = Arc::new(MockLedgerClient::endless());
    let db = Arc::new(LedgerDatabase::in_memory());
    let service = LedgerSyncService::with_config(
        client.clone(),
        db.clone(),
        SyncConfig {
            max_blocks_per_sync: 25,
            on_entry_error: ContinuePolicy::Stop,
        },
    );

    let fetched = service.fetch_and_store_latest().await.unwrap();
    assert_eq!(fetched.len(), 25);
    assert_eq!(client.fetch_calls.load(Ordering::SeqCst), 25);
}

#[tokio::test]
async fn offsets_advance_monotonically() {
    let client = Arc::new(MockLedgerClient::endless());
    let (service, _db) = service_with(client);

    let fetched = service.fetch_and_store_latest().await.unwrap();
    for pair in fetched.windows(2) {
        assert!(pair[1].block_offset > pair[0].block_offset);
    }
}

#[tokio::test]
async fn init_failure_fails_the_run_and_stores_nothing() {
    let client = Arc::new(MockLedgerClient::failing_init());
    let (service, db) = service_with(client.clone());

    let err = service.fetch_and_store_latest().await.unwrap_err();
    assert!(err.to_string().contains("initialization failed"));
    assert!(db.get_all().await.is_empty());
    assert_eq!(client.fetch_calls.load(Ordering::SeqCst), 0);

    // Initialization is retried on the next call.
    let _ = service.fetch_and_store_latest().await;
    assert_eq!(client.init_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn initialization_happens_once_across_runs() {
    let client = Arc::new(MockLedgerClient::new(two_block_chain()));
    let (service, _db) = service_with(client.clone());

    service.fetch_and_store_latest().await.unwrap();
    service.fetch_and_store_latest().await.unwrap();
    assert_eq!(client.init_calls.load(Ordering::SeqCst), 1);

    // disconnect() drops the initialized state.
    service.disconnect().await;
    service.fetch_and_store_latest().await.unwrap();
    assert_eq!(client.init_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn per_offset_error_keeps_prior_progress() {
    let mut blocks = HashMap::new();
    // Offset 0 links to 120, where the mock returns an error.
    blocks.insert(0, block(0, 120, &[("a", "X")]));
    let client = Arc::new(MockLedgerClient::new(blocks));
    let (service, db) = service_with(client);

    let fetched = service.fetch_and_store_latest().await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert!(db.get("a").await.is_some());
}

#[tokio::test]
async fn hole_in_the_chain_ends_the_walk_without_error() {
    let mut blocks = HashMap::new();
    blocks.insert(0, block(0, 120, &[("a", "X")]));
    blocks.insert(120, json!({"Ok": {}}));
    let client = Arc::new(MockLedgerClient::new(blocks));
    let (service, db) = service_with(client);

    let fetched = service.fetch_and_store_latest().await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(db.len().await, 1);
}

#[tokio::test]
async fn overlapping_runs_both_complete() {
    // No run lock by design: a manual refresh may race a poll tick. Both
    // runs re-derive the same remote truth, so last-write-wins per key.
    let client = Arc::new(MockLedgerClient::new(two_block_chain()));
    let (service, db) = service_with(client);

    let (first, second) =
        tokio::join!(service.fetch_and_store_latest(), service.fetch_and_store_latest());
    assert_eq!(first.unwrap().len(), 3);
    assert_eq!(second.unwrap().len(), 3);
    assert_eq!(db.len().await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bulk_upsert_is_atomic_to_readers() {
    let db = Arc::new(LedgerDatabase::in_memory());
    let batch_size = 50;

    let stop = Arc::new(AtomicBool::new(false));
    let reader = tokio::spawn({
        let db = db.clone();
        let stop = stop.clone();
        async move {
            while !stop.load(Ordering::SeqCst) {
                let seen = db.get_all().await.len();
                assert_eq!(seen % batch_size, 0, "reader observed a torn batch: {seen}");
                tokio::task::yield_now().await;
            }
        }
    });

    for round in 0..20 {
        let batch: Vec<LedgerEntry> = (0..batch_size)
            .map(|i| stored_entry(&format!("r{round}-k{i}")))
            .collect();
        db.bulk_upsert(batch).await.unwrap();
    }

    stop.store(true, Ordering::SeqCst);
    reader.await.unwrap();
    assert_eq!(db.len().await, 20 * batch_size);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_all_reach_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();

    // Racing writers must never let an older snapshot overwrite a newer one
    // on disk, or a reopen would lose committed entries.
    {
        let db = Arc::new(LedgerDatabase::open(path.clone()).await.unwrap());
        let writers: Vec<_> = (0..16)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move { db.upsert(stored_entry(&format!("k{i}"))).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }
    }

    let reopened = LedgerDatabase::open(path).await.unwrap();
    assert_eq!(reopened.len().await, 16);
}

#[tokio::test]
async fn poller_stop_without_start_is_a_noop() {
    let client = Arc::new(MockLedgerClient::new(two_block_chain()));
    let (service, _db) = service_with(client);
    let poller = LedgerPoller::new(service);

    assert!(!poller.is_running());
    poller.stop();
    poller.stop();
    assert!(!poller.is_running());
}

#[tokio::test]
async fn poller_fetches_immediately_and_on_every_tick() {
    let client = Arc::new(MockLedgerClient::new(two_block_chain()));
    let (service, _db) = service_with(client.clone());
    let poller = LedgerPoller::new(service);

    poller.start(Duration::from_millis(20)).await;
    assert!(poller.is_running());
    // Immediate fetch walked 2 blocks before start() returned.
    assert_eq!(client.fetch_calls.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_millis(70)).await;
    let while_running = client.fetch_calls.load(Ordering::SeqCst);
    assert!(while_running > 2, "timer ticks should trigger fetches");

    poller.stop();
    assert!(!poller.is_running());
    tokio::time::sleep(Duration::from_millis(60)).await;
    let after_stop = client.fetch_calls.load(Ordering::SeqCst);
    // One in-flight tick may still land, but no new ticks are scheduled.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(client.fetch_calls.load(Ordering::SeqCst), after_stop);
}

#[tokio::test]
async fn poller_keeps_polling_when_fetches_fail() {
    let client = Arc::new(MockLedgerClient::failing_init());
    let (service, _db) = service_with(client.clone());
    let poller = LedgerPoller::new(service);

    // The immediate fetch fails; polling must still be scheduled.
    poller.start(Duration::from_millis(20)).await;
    assert!(poller.is_running());

    tokio::time::sleep(Duration::from_millis(70)).await;
    assert!(client.init_calls.load(Ordering::SeqCst) > 1);
    poller.stop();
}

#[tokio::test]
async fn restart_replaces_the_previous_timer() {
    let client = Arc::new(MockLedgerClient::new(two_block_chain()));
    let (service, _db) = service_with(client);
    let poller = LedgerPoller::new(service);

    poller.start(Duration::from_millis(500)).await;
    poller.start(Duration::from_millis(500)).await;
    assert!(poller.is_running());
    poller.stop();
    assert!(!poller.is_running());
}

//! Integration tests for `InsuranceStore`: reentrancy, cancellation,
//! collaborator failures, and persistence across restarts.
//!
//! File-backed tests use a fresh temporary state directory each.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Notify;

use careport_core::benefits::BenefitBreakdown;
use careport_core::catalog::Catalog;
use careport_core::gateway::{ConnectRequest, EnrollmentGateway, LocalGateway};
use careport_core::store::{ConnectError, InsuranceStore, StoreOptions};
use careport_store::kv::{FileStore, KeyValueStore, MemoryStore};
use careport_store::snapshot::{
    PersistedInsuranceState, STORAGE_KEY, load_snapshot, save_snapshot,
};
use careport_test_utils::{SAMPLE_CATALOG_TOML, sample_connection, temp_file_store};

// ---------------------------------------------------------------------------
// Test collaborators
// ---------------------------------------------------------------------------

/// Gateway that parks inside `verify` until released.
#[derive(Default)]
struct GatedGateway {
    blocking: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedGateway {
    fn blocking() -> Self {
        Self {
            blocking: AtomicBool::new(true),
            ..Self::default()
        }
    }
}

#[async_trait]
impl EnrollmentGateway for GatedGateway {
    fn name(&self) -> &str {
        "gated"
    }

    async fn verify(&self, _request: &ConnectRequest) -> Result<()> {
        if self.blocking.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(())
    }
}

/// Gateway whose round trip always fails.
struct DownGateway;

#[async_trait]
impl EnrollmentGateway for DownGateway {
    fn name(&self) -> &str {
        "down"
    }

    async fn verify(&self, _request: &ConnectRequest) -> Result<()> {
        bail!("payer endpoint unreachable")
    }
}

/// Key-value store that refuses writes once `read_only` is set.
#[derive(Default)]
struct LockableStore {
    inner: MemoryStore,
    read_only: AtomicBool,
}

impl KeyValueStore for LockableStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            bail!("disk is read-only");
        }
        self.inner.put(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }
}

/// Key-value store that starts a `disconnect` on another thread while the
/// first connection write is still in progress.
#[derive(Default)]
struct RacingStore {
    inner: MemoryStore,
    store: OnceLock<Weak<InsuranceStore>>,
    racer: Mutex<Option<JoinHandle<()>>>,
}

impl KeyValueStore for RacingStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.inner.put(key, value)?;
        if !value.contains("\"planId\"") {
            return Ok(());
        }
        let Some(store) = self.store.get().and_then(Weak::upgrade) else {
            return Ok(());
        };
        let mut racer = self.racer.lock().unwrap();
        if racer.is_none() {
            *racer = Some(std::thread::spawn(move || {
                let _ = store.disconnect();
            }));
            // Give the disconnect a window to run before this write returns.
            std::thread::sleep(Duration::from_millis(50));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }
}

fn sample_catalog() -> Arc<Catalog> {
    Arc::new(Catalog::from_toml_str(SAMPLE_CATALOG_TOML).expect("sample catalog is valid"))
}

fn open_store(
    kv: Arc<dyn KeyValueStore>,
    gateway: Arc<dyn EnrollmentGateway>,
) -> InsuranceStore {
    InsuranceStore::open(sample_catalog(), kv, gateway, StoreOptions::default())
}

// ---------------------------------------------------------------------------
// Reentrancy and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_connect_while_in_flight_is_rejected() {
    let gateway = Arc::new(GatedGateway::blocking());
    let store = Arc::new(open_store(Arc::new(MemoryStore::new()), gateway.clone()));

    let first = tokio::spawn({
        let store = store.clone();
        async move { store.connect("acme", "acme-ppo", "MEM-1").await }
    });

    gateway.entered.notified().await;
    assert!(store.is_loading(), "first connect should be loading");

    let err = store
        .connect("north", "north-hmo", "MEM-2")
        .await
        .unwrap_err();
    assert_eq!(err, ConnectError::Busy);
    // The rejected call must not clobber the in-flight call's state.
    assert!(store.is_loading());
    assert_eq!(store.error(), None);

    gateway.release.notify_one();
    let conn = first.await.unwrap().expect("first connect should succeed");
    assert_eq!(conn.plan_id, "acme-ppo");
    assert!(!store.is_loading());

    // The busy flag is released once the first call finishes.
    gateway.blocking.store(false, Ordering::SeqCst);
    store.connect("north", "north-hmo", "MEM-2").await.unwrap();
    assert_eq!(store.connection().unwrap().plan_id, "north-hmo");
}

#[tokio::test]
async fn reads_see_previous_snapshot_during_connect() {
    let gateway = Arc::new(GatedGateway::default());
    let store = Arc::new(open_store(Arc::new(MemoryStore::new()), gateway.clone()));
    store.connect("acme", "acme-met", "MEM-1").await.unwrap();

    gateway.blocking.store(true, Ordering::SeqCst);
    let pending = tokio::spawn({
        let store = store.clone();
        async move { store.connect("acme", "acme-ppo", "MEM-1").await }
    });
    gateway.entered.notified().await;

    // Still priced against the old plan until the swap.
    let during = store.benefits_for_service_option("opt-1");
    assert_eq!(during.total_due_now, 55);

    gateway.release.notify_one();
    pending.await.unwrap().unwrap();
    let after = store.benefits_for_service_option("opt-1");
    assert_eq!(after.total_due_now, 175);
}

#[tokio::test]
async fn dropped_connect_releases_busy_flag() {
    let gateway = Arc::new(GatedGateway::blocking());
    let store = open_store(Arc::new(MemoryStore::new()), gateway.clone());

    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        store.connect("acme", "acme-ppo", "MEM-1"),
    )
    .await;
    assert!(timed_out.is_err(), "connect should still be parked");
    assert!(!store.is_loading());
    assert!(store.connection().is_none());

    gateway.blocking.store(false, Ordering::SeqCst);
    store.connect("acme", "acme-ppo", "MEM-1").await.unwrap();
}

// ---------------------------------------------------------------------------
// Collaborator failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_plan_is_reported_before_gateway_outage() {
    let store = open_store(Arc::new(MemoryStore::new()), Arc::new(DownGateway));

    let err = store
        .connect("acme", "no-such-plan", "MEM-2")
        .await
        .unwrap_err();
    assert_eq!(err, ConnectError::PlanNotFound("no-such-plan".into()));
    assert!(err.is_validation());
}

#[tokio::test]
async fn gateway_failure_is_connect_failed() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    save_snapshot(
        kv.as_ref(),
        &PersistedInsuranceState::new(Some(sample_connection())),
    )
    .unwrap();
    let store = open_store(kv, Arc::new(DownGateway));
    assert_eq!(store.connection(), Some(sample_connection()));

    let err = store
        .connect("north", "north-hmo", "MEM-2")
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectError::ConnectFailed(_)), "{err}");
    assert!(!err.is_validation());

    let snap = store.snapshot();
    assert_eq!(snap.connected_plan, Some(sample_connection()));
    assert!(!snap.loading);
    assert!(
        snap.error.unwrap().contains("payer endpoint unreachable"),
        "gateway cause should be in the message"
    );
}

#[tokio::test]
async fn persistence_failure_leaves_state_untouched() {
    let kv = Arc::new(LockableStore::default());
    let store = open_store(kv.clone(), Arc::new(LocalGateway::new()));
    let original = store.connect("acme", "acme-ppo", "MEM-1").await.unwrap();

    kv.read_only.store(true, Ordering::SeqCst);
    let err = store
        .connect("north", "north-hmo", "MEM-2")
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectError::ConnectFailed(_)), "{err}");
    assert_eq!(store.connection(), Some(original.clone()));

    // Disconnect cannot persist either, so the connection stays.
    assert!(store.disconnect().is_err());
    assert_eq!(store.connection(), Some(original));
    assert!(store.error().unwrap().contains("failed to disconnect"));
}

#[tokio::test]
async fn disconnect_during_connect_write_keeps_disk_and_memory_in_sync() {
    let kv = Arc::new(RacingStore::default());
    let store = Arc::new(open_store(kv.clone(), Arc::new(LocalGateway::new())));
    let _ = kv.store.set(Arc::downgrade(&store));

    store.connect("acme", "acme-ppo", "MEM-1").await.unwrap();

    let racer = kv
        .racer
        .lock()
        .unwrap()
        .take()
        .expect("connect write should start a disconnect");
    racer.join().unwrap();

    let persisted = load_snapshot(kv.as_ref()).unwrap().connected_plan;
    assert_eq!(store.connection(), persisted);
    assert!(persisted.is_none());
    assert_eq!(store.error(), None);
}

// ---------------------------------------------------------------------------
// Persistence across restarts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connection_survives_restart() {
    let (kv, _dir) = temp_file_store();
    let config = kv.config().clone();

    let store = open_store(Arc::new(kv), Arc::new(LocalGateway::new()));
    let conn = store.connect("north", "north-hmo", "MEM-7").await.unwrap();
    drop(store);

    let reopened = open_store(
        Arc::new(FileStore::new(config)),
        Arc::new(LocalGateway::new()),
    );
    assert_eq!(reopened.connection(), Some(conn));
    let b = reopened.benefits_for_service_option("opt-2");
    // 100 deductible, then 10% of 50 -> 5, plus 40 copay.
    assert_eq!(b.deductible_applied, 100);
    assert_eq!(b.coinsurance, 5);
    assert_eq!(b.total_due_now, 145);
}

#[tokio::test]
async fn disconnect_survives_restart() {
    let (kv, _dir) = temp_file_store();
    let config = kv.config().clone();

    let store = open_store(Arc::new(kv), Arc::new(LocalGateway::new()));
    store.connect("acme", "acme-ppo", "MEM-1").await.unwrap();
    store.disconnect().unwrap();

    let reopened = open_store(
        Arc::new(FileStore::new(config)),
        Arc::new(LocalGateway::new()),
    );
    assert!(reopened.connection().is_none());
}

#[tokio::test]
async fn reset_removes_persisted_record() {
    let kv = Arc::new(MemoryStore::new());
    let store = open_store(kv.clone(), Arc::new(LocalGateway::new()));
    store.connect("acme", "acme-ppo", "MEM-1").await.unwrap();
    assert_eq!(kv.len(), 1);

    store.reset().unwrap();
    assert!(kv.is_empty());
    assert!(store.connection().is_none());
    assert_eq!(store.error(), None);
}

#[test]
fn connection_to_retired_plan_is_discarded_on_open() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    save_snapshot(
        kv.as_ref(),
        &PersistedInsuranceState::new(Some(sample_connection())),
    )
    .unwrap();

    // The built-in catalog has no `acme-ppo`.
    let store = InsuranceStore::open(
        Arc::new(Catalog::builtin()),
        kv,
        Arc::new(LocalGateway::new()),
        StoreOptions::default(),
    );
    assert!(store.connection().is_none());
    assert_eq!(
        store.benefits_for_service_option("opt-1"),
        BenefitBreakdown::empty()
    );
}

#[test]
fn corrupt_snapshot_starts_disconnected() {
    let kv = Arc::new(MemoryStore::new());
    kv.put(STORAGE_KEY, "{\"connectedPlan\": 42}").unwrap();

    let store = open_store(kv, Arc::new(LocalGateway::new()));
    assert!(store.connection().is_none());
    assert_eq!(store.error(), None);
}

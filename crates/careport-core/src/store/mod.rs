//! The insurance store: owner of the patient's connected plan.
//!
//! [`InsuranceStore`] is constructed once by the composition root and
//! handed to whatever presents it (CLI commands, the HTTP router). It is the
//! single writer of connection state and the only caller of the persisted
//! snapshot functions.
//!
//! Concurrency model:
//!
//! ```text
//! connect()   -- busy flag (reject-if-busy) -> validate -> gateway.await
//!                -> [write lock: persist -> swap state]
//! benefits_*  -- read lock only, never suspends
//! disconnect  -- [write lock: persist null -> clear state]
//! reset       -- [write lock: remove record -> clear state]
//! ```
//!
//! Persisted and in-memory state change together under the write lock, so
//! writers never interleave between the two.

pub mod error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use careport_store::kv::KeyValueStore;
use careport_store::models::{Connection, Plan};
use careport_store::snapshot::{
    PersistedInsuranceState, clear_snapshot, load_snapshot, save_snapshot,
};

use crate::benefits::{self, BenefitBreakdown, DEFAULT_LIST_PRICE};
use crate::catalog::Catalog;
use crate::gateway::{ConnectRequest, EnrollmentGateway};

pub use error::ConnectError;

/// Tunables for an [`InsuranceStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Flat list price applied to every service option.
    pub list_price: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            list_price: DEFAULT_LIST_PRICE,
        }
    }
}

/// A consistent copy of the store's observable state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub connected_plan: Option<Connection>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    connected_plan: Option<Connection>,
    loading: bool,
    error: Option<String>,
}

/// Owns connection state and exposes the catalog and benefit estimates.
pub struct InsuranceStore {
    catalog: Arc<Catalog>,
    kv: Arc<dyn KeyValueStore>,
    gateway: Arc<dyn EnrollmentGateway>,
    options: StoreOptions,
    state: RwLock<StoreState>,
    connecting: AtomicBool,
}

impl InsuranceStore {
    /// Build a store and restore any persisted connection.
    ///
    /// A snapshot that cannot be read, or whose plan or provider is missing
    /// from `catalog`, is logged and dropped; the store then starts
    /// disconnected.
    pub fn open(
        catalog: Arc<Catalog>,
        kv: Arc<dyn KeyValueStore>,
        gateway: Arc<dyn EnrollmentGateway>,
        options: StoreOptions,
    ) -> Self {
        let connected_plan = match load_snapshot(kv.as_ref()) {
            Ok(snapshot) => snapshot.connected_plan,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "ignoring unreadable insurance snapshot");
                None
            }
        };

        let connected_plan = connected_plan.filter(|conn| {
            let known = catalog.find_plan(&conn.plan_id).is_some()
                && catalog.find_provider(&conn.provider_id).is_some();
            if !known {
                warn!(
                    plan_id = %conn.plan_id,
                    provider_id = %conn.provider_id,
                    "discarding persisted connection not present in catalog"
                );
            }
            known
        });

        if let Some(conn) = &connected_plan {
            info!(plan_id = %conn.plan_id, member_id = %conn.member_id, "restored connected plan");
        }

        Self {
            catalog,
            kv,
            gateway,
            options,
            state: RwLock::new(StoreState {
                connected_plan,
                ..StoreState::default()
            }),
            connecting: AtomicBool::new(false),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.read_state();
        StoreSnapshot {
            connected_plan: state.connected_plan.clone(),
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    pub fn connection(&self) -> Option<Connection> {
        self.read_state().connected_plan.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.read_state().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read_state().loading
    }

    /// The catalog entry for the connected plan, if any.
    pub fn connected_plan(&self) -> Option<&Plan> {
        let plan_id = self.read_state().connected_plan.as_ref()?.plan_id.clone();
        self.catalog.find_plan(&plan_id)
    }

    /// Estimate the cost of `service_option_id` under the connected plan.
    ///
    /// Returns [`BenefitBreakdown::empty`] when nothing is connected or the
    /// connected plan no longer resolves.
    pub fn benefits_for_service_option(&self, service_option_id: &str) -> BenefitBreakdown {
        match self.connected_plan() {
            Some(plan) => {
                let breakdown =
                    benefits::estimate(plan, service_option_id, self.options.list_price);
                tracing::debug!(
                    plan_id = %plan.id,
                    service_option_id,
                    total_due_now = breakdown.total_due_now,
                    "benefit estimate"
                );
                breakdown
            }
            None => BenefitBreakdown::empty(),
        }
    }

    /// Same as [`Self::benefits_for_service_option`], with `in_network`
    /// checked against the plan's clinic network.
    pub fn benefits_at_clinic(&self, service_option_id: &str, clinic_id: &str) -> BenefitBreakdown {
        match self.connected_plan() {
            Some(plan) => benefits::estimate_at_clinic(
                plan,
                service_option_id,
                self.options.list_price,
                clinic_id,
            ),
            None => BenefitBreakdown::empty(),
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Connect a plan, replacing any existing connection.
    ///
    /// Fails with [`ConnectError::Busy`] without touching state if another
    /// connect is in flight. Any other failure is recorded in the `error`
    /// field and leaves the previous connection in place. Dropping the
    /// returned future releases the busy flag and clears `loading`.
    pub async fn connect(
        &self,
        provider_id: &str,
        plan_id: &str,
        member_id: &str,
    ) -> Result<Connection, ConnectError> {
        let Some(_guard) = ConnectGuard::acquire(self) else {
            warn!(plan_id, "rejected connect: another connect is in flight");
            return Err(ConnectError::Busy);
        };

        {
            let mut state = self.write_state();
            state.loading = true;
            state.error = None;
        }

        let request = ConnectRequest {
            provider_id: provider_id.to_owned(),
            plan_id: plan_id.to_owned(),
            member_id: member_id.trim().to_owned(),
        };

        match self.try_connect(request).await {
            Ok(conn) => {
                info!(
                    plan_id = %conn.plan_id,
                    provider_id = %conn.provider_id,
                    member_id = %conn.member_id,
                    "connected insurance plan"
                );
                Ok(conn)
            }
            Err(e) => {
                warn!(plan_id, provider_id, error = %e, "connect failed");
                let mut state = self.write_state();
                state.error = Some(e.to_string());
                state.loading = false;
                Err(e)
            }
        }
    }

    async fn try_connect(&self, request: ConnectRequest) -> Result<Connection, ConnectError> {
        self.validate(&request)?;

        self.gateway
            .verify(&request)
            .await
            .map_err(|e| ConnectError::ConnectFailed(format!("{e:#}")))?;

        let conn = Connection {
            provider_id: request.provider_id,
            plan_id: request.plan_id,
            member_id: request.member_id,
            effective_date: Utc::now(),
        };

        // Persist and swap in one critical section.
        let mut state = self.write_state();
        save_snapshot(
            self.kv.as_ref(),
            &PersistedInsuranceState::new(Some(conn.clone())),
        )
        .map_err(|e| ConnectError::ConnectFailed(format!("{e:#}")))?;

        state.connected_plan = Some(conn.clone());
        state.error = None;
        state.loading = false;
        Ok(conn)
    }

    fn validate(&self, request: &ConnectRequest) -> Result<(), ConnectError> {
        let plan = self
            .catalog
            .find_plan(&request.plan_id)
            .ok_or_else(|| ConnectError::PlanNotFound(request.plan_id.clone()))?;

        if self.catalog.find_provider(&request.provider_id).is_none() {
            return Err(ConnectError::ProviderNotFound(request.provider_id.clone()));
        }

        if request.member_id.is_empty() {
            return Err(ConnectError::MissingMemberId);
        }

        if plan.provider_id != request.provider_id {
            return Err(ConnectError::PlanProviderMismatch {
                plan: plan.id.clone(),
                provider: request.provider_id.clone(),
            });
        }

        Ok(())
    }

    /// Clear the connected plan and persist the empty snapshot.
    ///
    /// If the snapshot cannot be written the connection is kept and the
    /// failure is recorded in the `error` field.
    pub fn disconnect(&self) -> anyhow::Result<()> {
        let mut state = self.write_state();
        if let Err(e) = save_snapshot(self.kv.as_ref(), &PersistedInsuranceState::default()) {
            warn!(error = %format!("{e:#}"), "disconnect failed");
            state.error = Some(format!("failed to disconnect: {e:#}"));
            return Err(e);
        }

        if let Some(conn) = state.connected_plan.take() {
            info!(plan_id = %conn.plan_id, "disconnected insurance plan");
        }
        Ok(())
    }

    pub fn clear_error(&self) {
        self.write_state().error = None;
    }

    /// Drop all in-memory state and delete the persisted record.
    pub fn reset(&self) -> anyhow::Result<()> {
        let mut state = self.write_state();
        clear_snapshot(self.kv.as_ref())?;
        *state = StoreState::default();
        info!("insurance store reset");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Locking helpers
    // -----------------------------------------------------------------------

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for InsuranceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsuranceStore")
            .field("gateway", &self.gateway.name())
            .field("options", &self.options)
            .field("state", &*self.read_state())
            .finish()
    }
}

/// Holds the busy flag for the duration of one `connect`.
struct ConnectGuard<'a> {
    store: &'a InsuranceStore,
}

impl<'a> ConnectGuard<'a> {
    fn acquire(store: &'a InsuranceStore) -> Option<Self> {
        store
            .connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { store })
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.store.write_state().loading = false;
        self.store.connecting.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! The persisted slice of insurance state.
//!
//! Only the connected plan survives a restart. The record lives under
//! [`STORAGE_KEY`] and its JSON shape is exactly
//! `{"connectedPlan": <Connection> | null}`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::kv::KeyValueStore;
use crate::models::Connection;

/// Fixed namespace key for the insurance snapshot.
pub const STORAGE_KEY: &str = "insurance-storage";

/// Wire shape of the persisted insurance state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedInsuranceState {
    pub connected_plan: Option<Connection>,
}

impl PersistedInsuranceState {
    pub fn new(connected_plan: Option<Connection>) -> Self {
        Self { connected_plan }
    }
}

/// Read the snapshot. An absent record loads as the empty state.
pub fn load_snapshot(kv: &dyn KeyValueStore) -> Result<PersistedInsuranceState> {
    let Some(raw) = kv
        .get(STORAGE_KEY)
        .context("failed to read insurance snapshot")?
    else {
        return Ok(PersistedInsuranceState::default());
    };

    serde_json::from_str(&raw).context("failed to parse insurance snapshot")
}

/// Write the snapshot, replacing any previous record.
pub fn save_snapshot(kv: &dyn KeyValueStore, state: &PersistedInsuranceState) -> Result<()> {
    let raw = serde_json::to_string(state).context("failed to serialize insurance snapshot")?;
    kv.put(STORAGE_KEY, &raw)
        .context("failed to write insurance snapshot")
}

/// Delete the snapshot record entirely.
pub fn clear_snapshot(kv: &dyn KeyValueStore) -> Result<()> {
    kv.remove(STORAGE_KEY)
        .context("failed to remove insurance snapshot")
}

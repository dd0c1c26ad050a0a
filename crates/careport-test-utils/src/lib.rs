//! Shared test fixtures for careport tests.
//!
//! Provides throwaway state directories and a small reference catalog whose
//! numbers line up with the benefit-estimate scenarios the tests assert on.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use careport_store::config::StoreConfig;
use careport_store::kv::FileStore;
use careport_store::models::{Connection, Plan, PlanCategory};

/// Catalog TOML used across crates.
///
/// - `acme-ppo`: 20% coinsurance, 300 remaining deductible, `opt-1` copay 25.
/// - `acme-met`: same terms with the deductible already met.
/// - `north-hmo`: belongs to the second provider, 10% coinsurance.
pub const SAMPLE_CATALOG_TOML: &str = r#"
[[providers]]
id = "acme"
name = "Acme Health"
logo = "logos/acme.svg"

[[providers]]
id = "north"
name = "Northwind Mutual"
logo = "logos/north.svg"

[[service_options]]
id = "opt-1"
name = "Primary care visit"

[[service_options]]
id = "opt-2"
name = "Specialist consult"

[[plans]]
id = "acme-ppo"
provider_id = "acme"
name = "Acme Choice PPO"
category = "ppo"
coinsurance_percent = 20
deductible_annual = 1000
deductible_remaining = 300
out_of_pocket_max = 5000
network_clinic_ids = ["clinic-downtown", "clinic-harbor"]

[plans.copay_by_service_option_id]
opt-1 = 25

[[plans]]
id = "acme-met"
provider_id = "acme"
name = "Acme Choice PPO (deductible met)"
category = "ppo"
coinsurance_percent = 20
deductible_annual = 1000
deductible_remaining = 0
out_of_pocket_max = 5000
network_clinic_ids = ["clinic-downtown"]

[plans.copay_by_service_option_id]
opt-1 = 25

[[plans]]
id = "north-hmo"
provider_id = "north"
name = "Northwind Value HMO"
category = "hmo"
coinsurance_percent = 10
deductible_annual = 500
deductible_remaining = 100
out_of_pocket_max = 3000
network_clinic_ids = ["clinic-uptown"]

[plans.copay_by_service_option_id]
opt-1 = 15
opt-2 = 40
"#;

/// Create a [`FileStore`] rooted in a fresh temporary directory.
///
/// Keep the returned [`TempDir`] alive for as long as the store is used.
pub fn temp_file_store() -> (FileStore, TempDir) {
    let dir = TempDir::new().expect("failed to create temp state dir");
    let store = FileStore::new(StoreConfig::new(dir.path()));
    (store, dir)
}

/// A plan with the given cost-sharing terms and a single copay entry for `opt-1`.
pub fn plan_with_terms(coinsurance_percent: u8, deductible_remaining: u64, copay: u64) -> Plan {
    Plan {
        id: "test-plan".to_string(),
        provider_id: "test-provider".to_string(),
        name: "Test Plan".to_string(),
        category: PlanCategory::Ppo,
        copay_by_service_option_id: BTreeMap::from([("opt-1".to_string(), copay)]),
        coinsurance_percent,
        deductible_annual: deductible_remaining.max(1000),
        deductible_remaining,
        out_of_pocket_max: 5000,
        network_clinic_ids: BTreeSet::from(["clinic-downtown".to_string()]),
    }
}

/// A connection to `acme-ppo` with a fixed effective date.
pub fn sample_connection() -> Connection {
    Connection {
        provider_id: "acme".to_string(),
        plan_id: "acme-ppo".to_string(),
        member_id: "MEM-0001".to_string(),
        effective_date: fixed_time(),
    }
}

/// 2026-01-15T09:30:00Z.
pub fn fixed_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-15T09:30:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

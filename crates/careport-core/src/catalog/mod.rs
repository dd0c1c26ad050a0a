//! Plan and provider catalog.
//!
//! The catalog is read-only reference data seeded once at startup, either
//! from the built-in `seed.toml` embedded in the binary or from a
//! user-supplied TOML file with the same layout. It is validated when
//! loaded; lookups never fail beyond returning `None`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use careport_store::models::{Plan, Provider, ServiceOption};

/// The embedded catalog seed.
static SEED_TOML: &str = include_str!("seed.toml");

/// Errors that can occur while loading and validating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("catalog TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("duplicate provider id: {0:?}")]
    DuplicateProvider(String),

    #[error("duplicate plan id: {0:?}")]
    DuplicatePlan(String),

    #[error("duplicate service option id: {0:?}")]
    DuplicateServiceOption(String),

    #[error("plan {plan:?} references unknown provider {provider:?}")]
    UnknownProvider { plan: String, provider: String },

    #[error("plan {plan:?} lists a copay for unknown service option {option:?}")]
    UnknownServiceOption { plan: String, option: String },

    #[error("plan {plan:?} has coinsurance {value}% (expected 0-100)")]
    CoinsuranceOutOfRange { plan: String, value: u8 },

    #[error("plan {plan:?} has {remaining} deductible remaining, above the annual {annual}")]
    DeductibleExceedsAnnual {
        plan: String,
        remaining: u64,
        annual: u64,
    },
}

/// On-disk layout of a catalog document.
#[derive(Debug, Deserialize)]
struct CatalogToml {
    #[serde(default)]
    providers: Vec<Provider>,
    #[serde(default)]
    plans: Vec<Plan>,
    #[serde(default)]
    service_options: Vec<ServiceOption>,
}

/// Validated, indexed plan/provider reference data.
#[derive(Debug, Clone)]
pub struct Catalog {
    providers: Vec<Provider>,
    plans: Vec<Plan>,
    service_options: Vec<ServiceOption>,
    provider_index: HashMap<String, usize>,
    plan_index: HashMap<String, usize>,
}

impl Catalog {
    /// Load the built-in catalog.
    ///
    /// # Panics
    ///
    /// Panics if the embedded seed is malformed. The seed ships inside the
    /// binary and is covered by tests, so a built binary always has a valid one.
    pub fn builtin() -> Self {
        Self::from_toml_str(SEED_TOML).expect("embedded catalog seed.toml is invalid")
    }

    /// Parse and validate a catalog document.
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let doc: CatalogToml = toml::from_str(content)?;
        Self::from_parts(doc.providers, doc.plans, doc.service_options)
    }

    /// Read, parse and validate a catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Build a catalog from already-constructed records.
    pub fn from_parts(
        providers: Vec<Provider>,
        plans: Vec<Plan>,
        service_options: Vec<ServiceOption>,
    ) -> Result<Self, CatalogError> {
        let mut provider_index = HashMap::with_capacity(providers.len());
        for (i, provider) in providers.iter().enumerate() {
            if provider_index.insert(provider.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateProvider(provider.id.clone()));
            }
        }

        let mut option_ids = HashSet::with_capacity(service_options.len());
        for option in &service_options {
            if !option_ids.insert(option.id.as_str()) {
                return Err(CatalogError::DuplicateServiceOption(option.id.clone()));
            }
        }

        let mut plan_index = HashMap::with_capacity(plans.len());
        for (i, plan) in plans.iter().enumerate() {
            if plan_index.insert(plan.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicatePlan(plan.id.clone()));
            }
            validate_plan(plan, &provider_index, &option_ids)?;
        }

        Ok(Self {
            providers,
            plans,
            service_options,
            provider_index,
            plan_index,
        })
    }

    pub fn find_provider(&self, id: &str) -> Option<&Provider> {
        self.provider_index.get(id).map(|&i| &self.providers[i])
    }

    pub fn find_plan(&self, id: &str) -> Option<&Plan> {
        self.plan_index.get(id).map(|&i| &self.plans[i])
    }

    pub fn find_service_option(&self, id: &str) -> Option<&ServiceOption> {
        self.service_options.iter().find(|o| o.id == id)
    }

    /// All providers, in seed order.
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// All plans, in seed order.
    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    pub fn service_options(&self) -> &[ServiceOption] {
        &self.service_options
    }

    /// Plans offered by `provider_id`, in seed order.
    pub fn plans_for_provider<'a>(&'a self, provider_id: &'a str) -> impl Iterator<Item = &'a Plan> {
        self.plans.iter().filter(move |p| p.provider_id == provider_id)
    }
}

fn validate_plan(
    plan: &Plan,
    provider_index: &HashMap<String, usize>,
    option_ids: &HashSet<&str>,
) -> Result<(), CatalogError> {
    if !provider_index.contains_key(&plan.provider_id) {
        return Err(CatalogError::UnknownProvider {
            plan: plan.id.clone(),
            provider: plan.provider_id.clone(),
        });
    }

    if plan.coinsurance_percent > 100 {
        return Err(CatalogError::CoinsuranceOutOfRange {
            plan: plan.id.clone(),
            value: plan.coinsurance_percent,
        });
    }

    if plan.deductible_remaining > plan.deductible_annual {
        return Err(CatalogError::DeductibleExceedsAnnual {
            plan: plan.id.clone(),
            remaining: plan.deductible_remaining,
            annual: plan.deductible_annual,
        });
    }

    // Only enforce copay keys when the catalog declares its service options.
    if !option_ids.is_empty() {
        if let Some(option) = plan
            .copay_by_service_option_id
            .keys()
            .find(|k| !option_ids.contains(k.as_str()))
        {
            return Err(CatalogError::UnknownServiceOption {
                plan: plan.id.clone(),
                option: option.clone(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

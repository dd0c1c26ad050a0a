use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Category of an insurance plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanCategory {
    Hmo,
    Ppo,
    Epo,
    Pos,
    Hdhp,
}

impl fmt::Display for PlanCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hmo => "hmo",
            Self::Ppo => "ppo",
            Self::Epo => "epo",
            Self::Pos => "pos",
            Self::Hdhp => "hdhp",
        };
        f.pad(s)
    }
}

impl FromStr for PlanCategory {
    type Err = PlanCategoryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hmo" => Ok(Self::Hmo),
            "ppo" => Ok(Self::Ppo),
            "epo" => Ok(Self::Epo),
            "pos" => Ok(Self::Pos),
            "hdhp" => Ok(Self::Hdhp),
            other => Err(PlanCategoryParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanCategory`] string.
#[derive(Debug, Clone)]
pub struct PlanCategoryParseError(pub String);

impl fmt::Display for PlanCategoryParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan category: {:?}", self.0)
    }
}

impl std::error::Error for PlanCategoryParseError {}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// An insurance company offering one or more plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    /// Logo reference (asset path or URL) used by the presentation layer.
    pub logo: String,
}

/// A coverage contract with its cost-sharing terms.
///
/// Amounts are whole currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub provider_id: String,
    pub name: String,
    pub category: PlanCategory,
    /// Flat copay per service option; options not listed carry no copay.
    #[serde(default)]
    pub copay_by_service_option_id: BTreeMap<String, u64>,
    /// Whole percent, 0-100.
    #[serde(default)]
    pub coinsurance_percent: u8,
    #[serde(default)]
    pub deductible_annual: u64,
    /// Never exceeds `deductible_annual`. Static seed data.
    #[serde(default)]
    pub deductible_remaining: u64,
    #[serde(default)]
    pub out_of_pocket_max: u64,
    #[serde(default)]
    pub network_clinic_ids: BTreeSet<String>,
}

impl Plan {
    /// Copay for a service option, zero when the plan lists none.
    pub fn copay_for(&self, service_option_id: &str) -> u64 {
        self.copay_by_service_option_id
            .get(service_option_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn covers_clinic(&self, clinic_id: &str) -> bool {
        self.network_clinic_ids.contains(clinic_id)
    }
}

/// A bookable service that can be priced against a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOption {
    pub id: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// The patient's currently active plan enrollment.
///
/// Serialized in camelCase because this record is part of the persisted
/// snapshot format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub provider_id: String,
    pub plan_id: String,
    pub member_id: String,
    pub effective_date: DateTime<Utc>,
}

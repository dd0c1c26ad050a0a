//! Benefit estimation: what the patient owes now for one service.
//!
//! The estimate is stateless. The deductible position it reports after the
//! charge is informational and is never written back to the plan.

use serde::Serialize;

use careport_store::models::Plan;

/// Flat list price used when no pricing source is configured.
pub const DEFAULT_LIST_PRICE: u64 = 150;

/// Cost-sharing result for a single service request.
///
/// All amounts are whole currency units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenefitBreakdown {
    pub list_price: u64,
    /// Deductible still outstanding after this charge.
    pub deductible_remaining: u64,
    /// Portion of this charge that counts toward the deductible.
    pub deductible_applied: u64,
    pub copay: u64,
    pub coinsurance: u64,
    pub total_due_now: u64,
    pub in_network: bool,
}

impl BenefitBreakdown {
    /// The all-zero, out-of-network result returned when no plan resolves.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Estimate the patient's share of `list_price` for `service_option_id`
/// under `plan`.
///
/// The deductible absorbs the charge first; coinsurance applies to what is
/// left; the copay is added on top. `in_network` is reported as `true`; use
/// [`estimate_at_clinic`] when the servicing clinic is known.
pub fn estimate(plan: &Plan, service_option_id: &str, list_price: u64) -> BenefitBreakdown {
    let copay = plan.copay_for(service_option_id);
    let percent = u64::from(plan.coinsurance_percent);
    let remaining = plan.deductible_remaining;

    let (deductible_applied, coinsurance) = if remaining > 0 {
        let applied = remaining.min(list_price);
        (applied, percent_of(list_price - applied, percent))
    } else {
        (0, percent_of(list_price, percent))
    };

    BenefitBreakdown {
        list_price,
        deductible_remaining: remaining.saturating_sub(deductible_applied),
        deductible_applied,
        copay,
        coinsurance,
        total_due_now: deductible_applied
            .saturating_add(coinsurance)
            .saturating_add(copay),
        in_network: true,
    }
}

/// Like [`estimate`], but `in_network` reflects whether `clinic_id` is in
/// the plan's network.
pub fn estimate_at_clinic(
    plan: &Plan,
    service_option_id: &str,
    list_price: u64,
    clinic_id: &str,
) -> BenefitBreakdown {
    BenefitBreakdown {
        in_network: plan.covers_clinic(clinic_id),
        ..estimate(plan, service_option_id, list_price)
    }
}

/// `amount * percent / 100`, rounded half up to a whole unit.
///
/// Computed in `u128` and saturated, so oversized prices cannot overflow.
fn percent_of(amount: u64, percent: u64) -> u64 {
    let scaled = (u128::from(amount) * u128::from(percent) + 50) / 100;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

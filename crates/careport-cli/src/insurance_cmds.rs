//! Commands that act on the connected plan: `connect`, `disconnect`,
//! `reset`, `status`, and `estimate`.

use anyhow::{Result, bail};

use careport_core::benefits::BenefitBreakdown;
use careport_core::store::InsuranceStore;

pub async fn run_connect(
    store: &InsuranceStore,
    provider_id: &str,
    plan_id: &str,
    member_id: &str,
) -> Result<()> {
    let conn = store.connect(provider_id, plan_id, member_id).await?;

    let plan_name = store
        .catalog()
        .find_plan(&conn.plan_id)
        .map(|p| p.name.as_str())
        .unwrap_or(conn.plan_id.as_str());
    println!("Connected {plan_name} for member {}.", conn.member_id);
    println!(
        "Effective: {}",
        conn.effective_date.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

pub fn run_disconnect(store: &InsuranceStore) -> Result<()> {
    if store.connection().is_none() {
        println!("No plan connected.");
        return Ok(());
    }
    store.disconnect()?;
    println!("Plan disconnected.");
    Ok(())
}

pub fn run_reset(store: &InsuranceStore) -> Result<()> {
    store.reset()?;
    println!("Insurance state cleared.");
    Ok(())
}

/// Show the connected plan and its terms.
pub fn run_status(store: &InsuranceStore) -> Result<()> {
    let Some(conn) = store.connection() else {
        println!("No plan connected.");
        println!("Run `careport plans` to browse, then `careport connect <provider> <plan> <member>`.");
        return Ok(());
    };

    let catalog = store.catalog();
    let provider_name = catalog
        .find_provider(&conn.provider_id)
        .map(|p| p.name.as_str())
        .unwrap_or(conn.provider_id.as_str());

    println!("Provider: {provider_name} ({})", conn.provider_id);
    println!("Member:   {}", conn.member_id);
    println!(
        "Since:    {}",
        conn.effective_date.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if let Some(plan) = store.connected_plan() {
        println!("Plan:     {} ({}, {})", plan.name, plan.id, plan.category);
        println!();
        println!("Coinsurance:         {}%", plan.coinsurance_percent);
        println!(
            "Deductible:          {} of {} remaining",
            plan.deductible_remaining, plan.deductible_annual
        );
        println!("Out-of-pocket max:   {}", plan.out_of_pocket_max);
        if !plan.copay_by_service_option_id.is_empty() {
            println!("Copays:");
            for (option, amount) in &plan.copay_by_service_option_id {
                println!("  {option:<16} {amount}");
            }
        }
        if !plan.network_clinic_ids.is_empty() {
            let clinics: Vec<&str> = plan.network_clinic_ids.iter().map(String::as_str).collect();
            println!("Network clinics:     {}", clinics.join(", "));
        }
    }
    Ok(())
}

/// Estimate what the connected plan charges for a service option.
pub fn run_estimate(
    store: &InsuranceStore,
    service_option_id: &str,
    clinic_id: Option<&str>,
    json: bool,
) -> Result<()> {
    if store.connection().is_none() {
        bail!("no plan connected; run `careport connect` first");
    }

    let breakdown = match clinic_id {
        Some(clinic) => store.benefits_at_clinic(service_option_id, clinic),
        None => store.benefits_for_service_option(service_option_id),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&breakdown)?);
        return Ok(());
    }

    let label = store
        .catalog()
        .find_service_option(service_option_id)
        .map(|o| o.name.as_str())
        .unwrap_or(service_option_id);
    println!("Estimate for {label}:");
    print_breakdown(&breakdown, clinic_id.is_some());
    Ok(())
}

fn print_breakdown(b: &BenefitBreakdown, network_checked: bool) {
    println!("  List price:            {:>8}", b.list_price);
    println!("  Deductible applied:    {:>8}", b.deductible_applied);
    println!("  Coinsurance:           {:>8}", b.coinsurance);
    println!("  Copay:                 {:>8}", b.copay);
    println!("  Total due now:         {:>8}", b.total_due_now);
    println!("  Deductible remaining:  {:>8}", b.deductible_remaining);
    if network_checked {
        let network = if b.in_network { "in network" } else { "OUT OF NETWORK" };
        println!("  Clinic:                {network}");
    }
}

//! `careport providers`, `careport plans`, and `careport options`: catalog
//! listings.

use anyhow::{Result, bail};

use careport_core::catalog::Catalog;
use careport_store::models::Plan;

/// List every provider with its plan count.
pub fn run_providers(catalog: &Catalog) -> Result<()> {
    if catalog.providers().is_empty() {
        println!("No providers in catalog.");
        return Ok(());
    }

    println!("{:<20} {:<28} {:>5}  LOGO", "ID", "NAME", "PLANS");
    for provider in catalog.providers() {
        let plan_count = catalog.plans_for_provider(&provider.id).count();
        println!(
            "{:<20} {:<28} {:>5}  {}",
            provider.id, provider.name, plan_count, provider.logo
        );
    }
    Ok(())
}

/// List plans, optionally restricted to one provider.
pub fn run_plans(catalog: &Catalog, provider_id: Option<&str>) -> Result<()> {
    let plans: Vec<&Plan> = match provider_id {
        Some(id) => {
            if catalog.find_provider(id).is_none() {
                bail!("insurance provider {id:?} was not found");
            }
            catalog.plans_for_provider(id).collect()
        }
        None => catalog.plans().iter().collect(),
    };

    if plans.is_empty() {
        println!("No plans found.");
        return Ok(());
    }

    println!(
        "{:<20} {:<18} {:<6} {:>6} {:>10} {:>10} {:>8}",
        "ID", "PROVIDER", "TYPE", "COINS", "DEDUCT", "REMAIN", "OOP MAX"
    );
    for plan in plans {
        println!(
            "{:<20} {:<18} {:<6} {:>5}% {:>10} {:>10} {:>8}",
            plan.id,
            plan.provider_id,
            plan.category,
            plan.coinsurance_percent,
            plan.deductible_annual,
            plan.deductible_remaining,
            plan.out_of_pocket_max,
        );
    }
    Ok(())
}

/// List the service options that can be priced.
pub fn run_options(catalog: &Catalog) -> Result<()> {
    if catalog.service_options().is_empty() {
        println!("No service options in catalog.");
        return Ok(());
    }

    for option in catalog.service_options() {
        println!("{:<16} {}", option.id, option.name);
    }
    Ok(())
}

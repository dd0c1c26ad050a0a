mod catalog_cmds;
mod config;
mod insurance_cmds;
mod serve_cmd;
#[cfg(test)]
mod test_util;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use careport_core::benefits::DEFAULT_LIST_PRICE;

use config::CareportConfig;

#[derive(Parser)]
#[command(name = "careport", about = "Patient portal insurance store and benefit estimator")]
struct Cli {
    /// State directory (overrides CAREPORT_STATE_DIR env var)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a careport config file
    Init {
        /// Custom catalog TOML file
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Flat list price used for estimates
        #[arg(long, default_value_t = DEFAULT_LIST_PRICE)]
        list_price: u64,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// List insurance providers
    Providers,
    /// List plans (optionally for one provider)
    Plans {
        /// Only show plans offered by this provider
        #[arg(long)]
        provider: Option<String>,
    },
    /// List service options that can be estimated
    Options,
    /// Connect an insurance plan
    Connect {
        /// Provider ID (e.g. bluecross)
        provider_id: String,
        /// Plan ID (e.g. bcbs-ppo-gold)
        plan_id: String,
        /// Member ID printed on the insurance card
        member_id: String,
    },
    /// Disconnect the current plan
    Disconnect,
    /// Clear all persisted insurance state
    Reset,
    /// Show the connected plan
    Status,
    /// Estimate the cost of a service under the connected plan
    Estimate {
        /// Service option ID (see `careport options`)
        service_option_id: String,
        /// Check network membership for this clinic
        #[arg(long)]
        clinic: Option<String>,
        /// Print the breakdown as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve the catalog, connection, and estimates over HTTP
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3000)]
        port: u16,
        /// Keep state in memory only
        #[arg(long)]
        ephemeral: bool,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Execute the `careport init` command: write config file.
///
/// `state_dir` comes from the global `--state-dir` flag.
fn cmd_init(
    state_dir: Option<PathBuf>,
    catalog: Option<PathBuf>,
    list_price: u64,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    if let Some(catalog_path) = &catalog {
        careport_core::catalog::Catalog::load(catalog_path)?;
    }

    let cfg = config::ConfigFile {
        storage: config::StorageSection {
            state_dir: state_dir.clone(),
        },
        catalog: config::CatalogSection {
            path: catalog.clone(),
        },
        pricing: config::PricingSection { list_price },
        gateway: config::GatewaySection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    if let Some(dir) = &state_dir {
        println!("  storage.state_dir = {}", dir.display());
    }
    match &catalog {
        Some(p) => println!("  catalog.path = {}", p.display()),
        None => println!("  catalog = built-in"),
    }
    println!("  pricing.list_price = {list_price}");
    println!();
    println!("Next: run `careport plans` to browse available plans.");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            catalog,
            list_price,
            force,
        } => {
            cmd_init(cli.state_dir, catalog, list_price, force)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "careport", &mut std::io::stdout());
        }
        Commands::Providers => {
            let resolved = CareportConfig::resolve(cli.state_dir.as_deref())?;
            catalog_cmds::run_providers(&resolved.load_catalog()?)?;
        }
        Commands::Plans { provider } => {
            let resolved = CareportConfig::resolve(cli.state_dir.as_deref())?;
            catalog_cmds::run_plans(&resolved.load_catalog()?, provider.as_deref())?;
        }
        Commands::Options => {
            let resolved = CareportConfig::resolve(cli.state_dir.as_deref())?;
            catalog_cmds::run_options(&resolved.load_catalog()?)?;
        }
        Commands::Connect {
            provider_id,
            plan_id,
            member_id,
        } => {
            let resolved = CareportConfig::resolve(cli.state_dir.as_deref())?;
            let store = resolved.open_store(false)?;
            insurance_cmds::run_connect(&store, &provider_id, &plan_id, &member_id).await?;
        }
        Commands::Disconnect => {
            let resolved = CareportConfig::resolve(cli.state_dir.as_deref())?;
            let store = resolved.open_store(false)?;
            insurance_cmds::run_disconnect(&store)?;
        }
        Commands::Reset => {
            let resolved = CareportConfig::resolve(cli.state_dir.as_deref())?;
            let store = resolved.open_store(false)?;
            insurance_cmds::run_reset(&store)?;
        }
        Commands::Status => {
            let resolved = CareportConfig::resolve(cli.state_dir.as_deref())?;
            let store = resolved.open_store(false)?;
            insurance_cmds::run_status(&store)?;
        }
        Commands::Estimate {
            service_option_id,
            clinic,
            json,
        } => {
            let resolved = CareportConfig::resolve(cli.state_dir.as_deref())?;
            let store = resolved.open_store(false)?;
            insurance_cmds::run_estimate(&store, &service_option_id, clinic.as_deref(), json)?;
        }
        Commands::Serve {
            bind,
            port,
            ephemeral,
        } => {
            let resolved = CareportConfig::resolve(cli.state_dir.as_deref())?;
            let store = resolved.open_store(ephemeral)?;
            serve_cmd::run_serve(store, &bind, port).await?;
        }
    }

    Ok(())
}

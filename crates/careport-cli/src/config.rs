//! Configuration file management for careport.
//!
//! Provides a TOML-based config file at `~/.config/careport/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use careport_core::benefits::DEFAULT_LIST_PRICE;
use careport_core::catalog::Catalog;
use careport_core::gateway::LocalGateway;
use careport_core::store::{InsuranceStore, StoreOptions};
use careport_store::config::StoreConfig;
use careport_store::kv::{FileStore, KeyValueStore, MemoryStore};

/// Environment variable naming a custom catalog TOML file.
pub const CATALOG_ENV_VAR: &str = "CAREPORT_CATALOG";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub pricing: PricingSection,
    #[serde(default)]
    pub gateway: GatewaySection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StorageSection {
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CatalogSection {
    /// Custom catalog TOML; the built-in seed is used when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingSection {
    pub list_price: u64,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            list_price: DEFAULT_LIST_PRICE,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GatewaySection {
    /// Artificial latency for the local enrollment gateway.
    #[serde(default)]
    pub latency_ms: u64,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the careport config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/careport` or `~/.config/careport`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("careport");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("careport")
}

/// Return the path to the careport config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file at `path`.
///
/// Returns `Ok(None)` when the file does not exist; a file that exists but
/// does not parse is an error.
pub fn load_config_from(path: &Path) -> Result<Option<ConfigFile>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Load the config file from its default location.
pub fn load_config() -> Result<Option<ConfigFile>> {
    load_config_from(&config_path())
}

/// Serialize and write the config file to `path`, creating parent dirs as
/// needed. Sets file permissions to 0600 on Unix.
pub fn save_config_to(config: &ConfigFile, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(config, &config_path())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct CareportConfig {
    pub store_config: StoreConfig,
    pub catalog_path: Option<PathBuf>,
    pub store_options: StoreOptions,
    pub gateway_latency: Duration,
}

impl CareportConfig {
    /// Resolve configuration from the default config file location.
    pub fn resolve(cli_state_dir: Option<&Path>) -> Result<Self> {
        let file_config = load_config()?;
        Ok(Self::resolve_with(cli_state_dir, file_config))
    }

    /// Resolve using the chain: CLI flag > env var > config file > default.
    ///
    /// - State dir: `cli_state_dir` > `CAREPORT_STATE_DIR` > `storage.state_dir` > platform data dir
    /// - Catalog: `CAREPORT_CATALOG` > `catalog.path` > built-in seed
    /// - List price and gateway latency: config file > defaults
    pub fn resolve_with(cli_state_dir: Option<&Path>, file_config: Option<ConfigFile>) -> Self {
        let file_config = file_config.unwrap_or_default();

        let state_dir = if let Some(dir) = cli_state_dir {
            dir.to_path_buf()
        } else if let Ok(dir) = std::env::var(StoreConfig::ENV_VAR) {
            PathBuf::from(dir)
        } else if let Some(dir) = file_config.storage.state_dir {
            dir
        } else {
            StoreConfig::default_state_dir()
        };

        let catalog_path = std::env::var(CATALOG_ENV_VAR)
            .ok()
            .map(PathBuf::from)
            .or(file_config.catalog.path);

        Self {
            store_config: StoreConfig::new(state_dir),
            catalog_path,
            store_options: StoreOptions {
                list_price: file_config.pricing.list_price,
            },
            gateway_latency: Duration::from_millis(file_config.gateway.latency_ms),
        }
    }

    /// Load the configured catalog, or the built-in one.
    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog_path {
            Some(path) => Catalog::load(path)
                .with_context(|| format!("failed to load catalog from {}", path.display())),
            None => Ok(Catalog::builtin()),
        }
    }

    /// Compose an [`InsuranceStore`] from this configuration.
    ///
    /// With `ephemeral`, state is kept in memory and nothing is written to
    /// the state directory.
    pub fn open_store(&self, ephemeral: bool) -> Result<InsuranceStore> {
        let catalog = Arc::new(self.load_catalog()?);
        let kv: Arc<dyn KeyValueStore> = if ephemeral {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(FileStore::new(self.store_config.clone()))
        };
        let gateway = Arc::new(LocalGateway::with_latency(self.gateway_latency));
        Ok(InsuranceStore::open(
            catalog,
            kv,
            gateway,
            self.store_options,
        ))
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

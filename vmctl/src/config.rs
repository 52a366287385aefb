//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `VMCTL_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `VMCTL_` override YAML values
//! 3. **HCLOUD_TOKEN / DATABASE_URL** - Special cases: override `provider.api_token` and
//!    `database.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `VMCTL_PROVISIONING__SETTLE_DELAY=5s` sets the `provisioning.settle_delay` field.
//!
//! ## Configuration Structure
//!
//! - **Provider**: `provider.api_url`, `provider.api_token`, `provider.request_timeout`,
//!   `provider.page_size` - Hetzner Cloud API access
//! - **Database**: `database.url`, `database.max_connections` - SQLite mapping store
//! - **Provisioning**: `provisioning.default_machine_type`, `provisioning.settle_delay`,
//!   `provisioning.managed_by_label` - creation workflow settings
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Provider token (preferred method)
//! HCLOUD_TOKEN="..."
//!
//! # Or use VMCTL_PROVIDER__API_TOKEN
//! VMCTL_PROVIDER__API_TOKEN="..."
//!
//! # Store mappings somewhere else
//! DATABASE_URL="sqlite:///var/lib/vmctl/servers.db"
//! ```

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Largest page size the Hetzner API accepts
pub const MAX_PAGE_SIZE: u32 = 50;

/// Simple CLI args - just for specifying config file
#[derive(clap::Args, Debug, Clone)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "VMCTL_CONFIG", default_value = "config.yaml", global = true)]
    pub config: String,

    /// Validate configuration and exit without running a command.
    #[arg(long, global = true)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults, so an empty file plus `HCLOUD_TOKEN` is a working setup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Cloud provider API access
    pub provider: ProviderConfig,
    /// Mapping store location
    pub database: DatabaseConfig,
    /// Creation workflow settings
    pub provisioning: ProvisioningConfig,
}

/// Cloud provider API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the provider API
    pub api_url: Url,
    /// API token (read/write project token)
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    /// Timeout applied to every provider request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Page size for inventory listings
    pub page_size: u32,
}

/// SQLite mapping store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite connection string; the file is created if missing
    pub url: String,
    pub max_connections: u32,
}

/// Provisioning workflow configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisioningConfig {
    /// Machine type used for every created server
    pub default_machine_type: String,
    /// How long to wait after creation before reading server details back
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    /// Value of the `managed_by` label put on created servers
    pub managed_by_label: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("https://api.hetzner.cloud/v1/").expect("default provider URL is valid"),
            api_token: None,
            request_timeout: Duration::from_secs(30),
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://servers.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            default_machine_type: "cx23".to_string(),
            settle_delay: Duration::from_secs(20),
            managed_by_label: "vmctl".to_string(),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.provider.api_token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(Error::Validation {
                message: "Config validation: provider.api_token is not configured. \
                     Please set HCLOUD_TOKEN or VMCTL_PROVIDER__API_TOKEN."
                    .to_string(),
            });
        }

        if self.provider.page_size == 0 || self.provider.page_size > MAX_PAGE_SIZE {
            return Err(Error::Validation {
                message: format!(
                    "Config validation: provider.page_size must be between 1 and {MAX_PAGE_SIZE} (got {})",
                    self.provider.page_size
                ),
            });
        }

        if self.provisioning.default_machine_type.trim().is_empty() {
            return Err(Error::Validation {
                message: "Config validation: provisioning.default_machine_type cannot be empty".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(Error::Validation {
                message: "Config validation: database.max_connections must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("VMCTL_").split("__").ignore(&["CONFIG", "USER"]))
            // Common token and database patterns
            .merge(Env::raw().only(&["HCLOUD_TOKEN"]).map(|_| "provider.api_token".into()))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
    }
}

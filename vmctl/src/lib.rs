//! # vmctl: chat-ops VM provisioning
//!
//! `vmctl` lets chat users create virtual machines on Hetzner Cloud with one short command, without
//! opening the provider console. A user names the server, picks a location and an x86 image, and
//! optionally an app template and a count; `vmctl` fills in everything else.
//!
//! ## Overview
//!
//! The crate is the provisioning core behind a chat bot. It keeps a cached view of the provider
//! account, decides which network, ssh key and firewall a new server gets, creates servers in
//! small batches and remembers which user created which server.
//!
//! ### What It Does
//!
//! A creation request is validated, checked against the account quota (when the provider reports
//! one) and expanded into names (`WEB`, `WEB1`, `WEB2`, ...). Each name is then resolved against
//! the inventory and created in order. The first failure stops the batch; the reply names the
//! servers that were created before it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  commands   │  (CLI surface, text replies)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐     ┌──────────────────────┐
//! │ Application │ ──→ │ InventoryCacheService│ ──→ CloudProvider (Hetzner)
//! └──────┬──────┘     └──────────────────────┘
//!        ↓
//! ┌─────────────┐     ┌──────────────┐
//! │ Provisioner │ ──→ │ MappingStore │ ──→ SQLite
//! └─────────────┘     └──────────────┘
//! ```
//!
//! - [`inventory`]: the provider inventory snapshot and its lazily built, manually refreshed cache
//! - [`resolution`]: picking one network, ssh key or firewall for a server
//! - [`provisioning`]: the batch creation workflow
//! - [`store`] and [`db`]: the SQLite mapping store
//! - [`provider`]: the provider trait, typed records and the Hetzner client
//! - [`templates`]: cloud-init app templates
//!
//! ## Configuration
//!
//! See [`config`] for the YAML layout and environment overrides. The only required setting is the
//! provider token (`HCLOUD_TOKEN`).

pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod inventory;
pub mod provider;
pub mod provisioning;
pub mod resolution;
pub mod store;
pub mod telemetry;
pub mod templates;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::{debug, info, instrument};

pub use config::Config;
use db::models::user_defaults::UserDefaults;
use errors::{Error, Result};
use inventory::{InventoryCacheService, InventorySummary, resource_listing, suggest};
use provider::{CloudProvider, CreatedServer, ServerDetails, hetzner::HetznerClient};
use provisioning::{ProvisionReport, ProvisionRequest, Provisioner};
use store::MappingStore;
use types::abbrev_owner;

pub use types::{OwnerId, ResourceId, ServerId};

/// Get the vmctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Open (creating if needed) the SQLite database and apply migrations
async fn setup_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database.url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(options)
        .await?;
    migrator().run(&pool).await?;
    info!("Mapping store ready at {}", config.database.url);
    Ok(pool)
}

/// Main application struct that owns all resources.
///
/// Holds the configuration, the SQLite pool, the provider client, the inventory cache and the
/// provisioner. Every user-facing operation is a method here; [`commands`] renders the results.
pub struct Application {
    config: Config,
    pool: SqlitePool,
    provider: Arc<dyn CloudProvider>,
    inventory: Arc<InventoryCacheService>,
    store: Arc<dyn MappingStore>,
    provisioner: Provisioner,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting vmctl with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        let provider = Arc::new(HetznerClient::new(&config.provider)?);

        Ok(Self::from_parts(config, pool, provider))
    }

    /// Assemble an application from an existing pool and provider
    pub fn from_parts(config: Config, pool: SqlitePool, provider: Arc<dyn CloudProvider>) -> Self {
        let inventory = Arc::new(InventoryCacheService::new(provider.clone()));
        let store: Arc<dyn MappingStore> = Arc::new(pool.clone());
        let provisioner = Provisioner::builder()
            .provider(provider.clone())
            .inventory(inventory.clone())
            .store(store.clone())
            .settings(config.provisioning.clone())
            .build();

        Self {
            config,
            pool,
            provider,
            inventory,
            store,
            provisioner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn inventory(&self) -> &InventoryCacheService {
        &self.inventory
    }

    /// How long to wait after a batch before reading the servers back
    pub fn settle_delay(&self) -> Duration {
        self.config.provisioning.settle_delay
    }

    /// Create the servers of a request. See [`Provisioner::provision`].
    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionReport> {
        self.provisioner.provision(request).await
    }

    /// Read back servers created by [`Application::provision`]
    pub async fn fetch_details(&self, created: &[CreatedServer]) -> Vec<Result<ServerDetails>> {
        self.provisioner.fetch_details(created).await
    }

    /// Rebuild the inventory cache from the provider
    pub async fn refresh_inventory(&self) -> Result<InventorySummary> {
        self.inventory.refresh().await
    }

    /// Sorted names of x86 images
    pub async fn list_x86_images(&self) -> Result<Vec<String>> {
        Ok(self.inventory.get_or_build().await?.x86_image_names())
    }

    /// Sorted location names
    pub async fn list_locations(&self) -> Result<Vec<String>> {
        Ok(self.inventory.get_or_build().await?.location_names())
    }

    pub async fn list_networks(&self) -> Result<Option<String>> {
        Ok(resource_listing(&self.inventory.get_or_build().await?.networks))
    }

    pub async fn list_ssh_keys(&self) -> Result<Option<String>> {
        Ok(resource_listing(&self.inventory.get_or_build().await?.ssh_keys))
    }

    pub async fn list_firewalls(&self) -> Result<Option<String>> {
        Ok(resource_listing(&self.inventory.get_or_build().await?.firewalls))
    }

    /// Replace the owner's defaults. Every given id must exist in the inventory.
    #[instrument(skip(self, owner_id), fields(owner = %abbrev_owner(owner_id)), err)]
    pub async fn set_defaults(&self, owner_id: &str, defaults: UserDefaults) -> Result<UserDefaults> {
        let snapshot = self.inventory.get_or_build().await?;

        let unknown = |field: &str, listing: &str, id: ResourceId| Error::Validation {
            message: format!("Unknown {field} {id}. Use `{listing}` to list."),
        };
        if let Some(id) = defaults.network_id
            && !snapshot.networks.contains_key(&id)
        {
            return Err(unknown("network_id", "networks", id));
        }
        if let Some(id) = defaults.ssh_key_id
            && !snapshot.ssh_keys.contains_key(&id)
        {
            return Err(unknown("ssh_key_id", "ssh-keys", id));
        }
        if let Some(id) = defaults.firewall_id
            && !snapshot.firewalls.contains_key(&id)
        {
            return Err(unknown("firewall_id", "firewalls", id));
        }

        self.store.set_defaults(owner_id, defaults).await?;
        Ok(defaults)
    }

    pub async fn get_defaults(&self, owner_id: &str) -> Result<UserDefaults> {
        Ok(self.store.get_defaults(owner_id).await?)
    }

    /// Look up one of the owner's servers by name or id and read its current state
    #[instrument(skip(self, owner_id), fields(owner = %abbrev_owner(owner_id)), err)]
    pub async fn server_details(&self, owner_id: &str, query: &str) -> Result<ServerDetails> {
        let id = self.store.find_server(owner_id, query).await?.ok_or_else(|| Error::NotFound {
            resource: "Server".to_string(),
            id: query.trim().to_string(),
        })?;

        self.provider
            .get_server(id)
            .await
            .map_err(|source| Error::ProviderRead { id, source })
    }

    /// Autocomplete over x86 image names. Empty until the cache has been built.
    pub fn suggest_images(&self, current: &str) -> Vec<String> {
        self.inventory
            .current()
            .map(|snapshot| suggest(&snapshot.x86_image_names(), current))
            .unwrap_or_default()
    }

    /// Autocomplete over location names. Empty until the cache has been built.
    pub fn suggest_locations(&self, current: &str) -> Vec<String> {
        self.inventory
            .current()
            .map(|snapshot| suggest(&snapshot.location_names(), current))
            .unwrap_or_default()
    }

    /// Close database connections
    pub async fn close(self) {
        info!("Closing database connections...");
        self.pool.close().await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{FakeProvider, sample_inventory};

    fn app(pool: SqlitePool) -> (Arc<FakeProvider>, Application) {
        let provider = Arc::new(FakeProvider::new(sample_inventory()));
        let mut config = Config::default();
        config.provisioning.settle_delay = Duration::ZERO;
        (provider.clone(), Application::from_parts(config, pool, provider))
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_set_defaults_validates_ids(pool: SqlitePool) {
        let (_, app) = app(pool);

        let err = app
            .set_defaults(
                "1234",
                UserDefaults {
                    network_id: Some(999),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Unknown network_id 999. Use `networks` to list.");
        assert_eq!(app.get_defaults("1234").await.unwrap(), UserDefaults::default());

        let defaults = UserDefaults {
            network_id: Some(2),
            ssh_key_id: Some(10),
            firewall_id: None,
        };
        app.set_defaults("1234", defaults).await.unwrap();
        assert_eq!(app.get_defaults("1234").await.unwrap(), defaults);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_provision_then_look_up_server(pool: SqlitePool) {
        let (_, app) = app(pool);
        app.set_defaults(
            "1234",
            UserDefaults {
                network_id: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let request = ProvisionRequest::builder()
            .owner_id("1234")
            .name("web")
            .location("fsn1")
            .image("debian-12")
            .count(2)
            .build();
        let report = app.provision(&request).await.unwrap();
        assert_eq!(report.created.len(), 2);

        let by_name = app.server_details("1234", "WEB1").await.unwrap();
        assert_eq!(by_name.id, report.created[1].id);
        assert_eq!(by_name.location.as_deref(), Some("fsn1"));

        let by_id = app.server_details("1234", &report.created[0].id.to_string()).await.unwrap();
        assert_eq!(by_id.name, "WEB");

        let err = app.server_details("5678", "WEB").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(err.user_message(), "I can't find that server under your user.");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_listings_and_autocomplete(pool: SqlitePool) {
        let (provider, app) = app(pool);

        // nothing cached yet
        assert!(app.suggest_images("ubu").is_empty());
        assert_eq!(provider.listing_calls("images"), 0);

        assert_eq!(app.list_x86_images().await.unwrap(), vec!["debian-12", "ubuntu-24.04"]);
        assert_eq!(app.list_locations().await.unwrap(), vec!["fsn1", "hel1", "nbg1"]);
        assert_eq!(app.list_ssh_keys().await.unwrap().as_deref(), Some("- deploy (id 10)"));

        assert_eq!(app.suggest_images("UBU"), vec!["ubuntu-24.04"]);
        assert_eq!(app.suggest_locations("1").len(), 3);
        assert_eq!(provider.listing_calls("images"), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refresh_reports_counts(pool: SqlitePool) {
        let (provider, app) = app(pool);

        let summary = app.refresh_inventory().await.unwrap();
        assert_eq!(summary.x86_images, 2);
        assert_eq!(summary.networks, 2);

        provider.fail_listing("locations");
        assert!(app.refresh_inventory().await.is_err());
        assert_eq!(app.list_locations().await.unwrap().len(), 3);
    }
}

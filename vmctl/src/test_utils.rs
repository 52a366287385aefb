//! Test utilities (available with the `test-utils` feature): an in-memory provider and mapping
//! store with failure injection, plus a small sample inventory.

use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    config::ProvisioningConfig,
    db::{
        errors::{DbError, Result as DbResult},
        models::user_defaults::UserDefaults,
    },
    inventory::{InventoryCacheService, InventorySnapshot},
    provider::{
        CloudProvider, CreatedServer, Firewall, Image, Location, MachineType, Network, ProviderError, Result, ServerDetails,
        ServerQuota, ServerSpec, SshKey,
    },
    provisioning::Provisioner,
    store::MappingStore,
    types::{OwnerId, ServerId},
};

/// Account with three locations, two x86 images and one arm image, two networks and a single
/// ssh key and firewall.
pub fn sample_inventory() -> InventorySnapshot {
    let image = |id, name: &str, arch: &str| Image {
        id,
        name: Some(name.to_string()),
        description: None,
        architecture: Some(arch.to_string()),
    };
    let location = |id, name: &str| Location {
        id,
        name: name.to_string(),
        description: None,
        network_zone: Some("eu-central".to_string()),
    };
    let machine_type = |id, name: &str, arch: &str| MachineType {
        id,
        name: name.to_string(),
        cores: Some(2),
        memory: Some(4.0),
        disk: Some(40),
        architecture: Some(arch.to_string()),
    };

    InventorySnapshot::from_listings(
        vec![location(1, "fsn1"), location(2, "nbg1"), location(3, "hel1")],
        vec![machine_type(1, "cx23", "x86"), machine_type(2, "cax11", "arm")],
        vec![
            image(101, "ubuntu-24.04", "x86"),
            image(102, "debian-12", "x86"),
            image(103, "ubuntu-arm", "arm"),
        ],
        vec![
            Network {
                id: 1,
                name: "frontend".to_string(),
                ip_range: Some("10.0.0.0/16".to_string()),
            },
            Network {
                id: 2,
                name: "backend".to_string(),
                ip_range: Some("10.1.0.0/16".to_string()),
            },
        ],
        vec![SshKey {
            id: 10,
            name: "deploy".to_string(),
            fingerprint: None,
        }],
        vec![Firewall {
            id: 20,
            name: "default".to_string(),
        }],
    )
}

#[derive(Default)]
struct FakeState {
    inventory: InventorySnapshot,
    failing_listings: HashSet<String>,
    listing_calls: HashMap<String, usize>,
    quota: Option<ServerQuota>,
    fail_quota_read: bool,
    /// 1-based create call index -> (code, message)
    create_failures: HashMap<usize, (String, String)>,
    create_calls: usize,
    created: Vec<(CreatedServer, ServerSpec)>,
    failing_reads: HashSet<ServerId>,
}

/// In-memory [`CloudProvider`] serving a fixed inventory.
///
/// Listing names used for failure injection and call counting: `locations`, `server types`,
/// `images`, `networks`, `ssh keys`, `firewalls`.
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new(inventory: InventorySnapshot) -> Self {
        Self {
            state: Mutex::new(FakeState {
                inventory,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn set_inventory(&self, inventory: InventorySnapshot) {
        self.state().inventory = inventory;
    }

    pub fn fail_listing(&self, resource: &str) {
        self.state().failing_listings.insert(resource.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_listings.clear();
        state.create_failures.clear();
        state.failing_reads.clear();
        state.fail_quota_read = false;
    }

    pub fn listing_calls(&self, resource: &str) -> usize {
        self.state().listing_calls.get(resource).copied().unwrap_or(0)
    }

    pub fn set_quota(&self, quota: Option<ServerQuota>) {
        self.state().quota = quota;
    }

    pub fn fail_quota_read(&self) {
        self.state().fail_quota_read = true;
    }

    /// Make the `call`-th create call (1-based) fail with an API error
    pub fn fail_create_at(&self, call: usize, code: &str, message: &str) {
        self.state()
            .create_failures
            .insert(call, (code.to_string(), message.to_string()));
    }

    pub fn fail_read(&self, id: ServerId) {
        self.state().failing_reads.insert(id);
    }

    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    /// Specs of the servers created so far, in order
    pub fn created_specs(&self) -> Vec<ServerSpec> {
        self.state().created.iter().map(|(_, spec)| spec.clone()).collect()
    }

    fn listing<T>(&self, resource: &str, items: impl FnOnce(&InventorySnapshot) -> Vec<T>) -> Result<Vec<T>> {
        let mut state = self.state();
        *state.listing_calls.entry(resource.to_string()).or_default() += 1;
        if state.failing_listings.contains(resource) {
            return Err(ProviderError::Api {
                status: 503,
                code: "unavailable".to_string(),
                message: format!("{resource} listing unavailable"),
            });
        }
        Ok(items(&state.inventory))
    }
}

#[async_trait]
impl CloudProvider for FakeProvider {
    async fn list_locations(&self) -> Result<Vec<Location>> {
        self.listing("locations", |inv| inv.locations.values().cloned().collect())
    }

    async fn list_machine_types(&self) -> Result<Vec<MachineType>> {
        self.listing("server types", |inv| inv.machine_types.values().cloned().collect())
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        self.listing("images", |inv| inv.images.values().cloned().collect())
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        self.listing("networks", |inv| inv.networks.values().cloned().collect())
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        self.listing("ssh keys", |inv| inv.ssh_keys.values().cloned().collect())
    }

    async fn list_firewalls(&self) -> Result<Vec<Firewall>> {
        self.listing("firewalls", |inv| inv.firewalls.values().cloned().collect())
    }

    async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer> {
        let mut state = self.state();
        state.create_calls += 1;
        if let Some((code, message)) = state.create_failures.get(&state.create_calls) {
            return Err(ProviderError::Api {
                status: 403,
                code: code.clone(),
                message: message.clone(),
            });
        }
        let server = CreatedServer {
            id: 1000 + state.create_calls as ServerId,
            name: spec.name.clone(),
        };
        state.created.push((server.clone(), spec.clone()));
        Ok(server)
    }

    async fn get_server(&self, id: ServerId) -> Result<ServerDetails> {
        let state = self.state();
        if state.failing_reads.contains(&id) {
            return Err(ProviderError::Api {
                status: 500,
                code: "server_error".to_string(),
                message: "read failed".to_string(),
            });
        }
        let (server, spec) = state.created.iter().find(|(s, _)| s.id == id).ok_or_else(|| ProviderError::Api {
            status: 404,
            code: "not_found".to_string(),
            message: format!("server {id} not found"),
        })?;
        Ok(ServerDetails {
            id: server.id,
            name: server.name.clone(),
            status: "running".to_string(),
            machine_type: spec.machine_type.clone(),
            datacenter: Some(format!("{}-dc1", spec.location)),
            location: Some(spec.location.clone()),
            ipv4: Some(format!("203.0.113.{}", id % 256)),
            ipv6: None,
            image: Some(spec.image_id.to_string()),
        })
    }

    async fn server_quota(&self) -> Result<Option<ServerQuota>> {
        let state = self.state();
        if state.fail_quota_read {
            return Err(ProviderError::Decode("limits unavailable".to_string()));
        }
        Ok(state.quota)
    }
}

/// In-memory [`MappingStore`] whose writes can be made to fail.
#[derive(Default)]
pub struct MemoryStore {
    servers: Mutex<Vec<(OwnerId, ServerId, String)>>,
    defaults: Mutex<HashMap<OwnerId, UserDefaults>>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn fail_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }

    pub fn servers(&self) -> Vec<(OwnerId, ServerId, String)> {
        self.servers.lock().unwrap().clone()
    }

    fn check_writable(&self) -> DbResult<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(DbError::Other(anyhow::anyhow!("database is locked")));
        }
        Ok(())
    }
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn put_server(&self, owner_id: &str, server_id: ServerId, server_name: &str) -> DbResult<()> {
        self.check_writable()?;
        let mut servers = self.servers.lock().unwrap();
        servers.retain(|(owner, id, _)| !(owner == owner_id && *id == server_id));
        servers.push((owner_id.to_string(), server_id, server_name.to_string()));
        Ok(())
    }

    async fn find_server(&self, owner_id: &str, query: &str) -> DbResult<Option<ServerId>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }
        let numeric = query.chars().all(|c| c.is_ascii_digit());
        let servers = self.servers.lock().unwrap();
        Ok(servers
            .iter()
            .rev()
            .filter(|(owner, _, _)| owner == owner_id)
            .find(|(_, id, name)| if numeric { id.to_string() == query } else { name == query })
            .map(|(_, id, _)| *id))
    }

    async fn get_defaults(&self, owner_id: &str) -> DbResult<UserDefaults> {
        Ok(self.defaults.lock().unwrap().get(owner_id).copied().unwrap_or_default())
    }

    async fn set_defaults(&self, owner_id: &str, defaults: UserDefaults) -> DbResult<()> {
        self.check_writable()?;
        self.defaults.lock().unwrap().insert(owner_id.to_string(), defaults);
        Ok(())
    }
}

/// Provisioner over the given fakes with default settings and no settle delay
pub fn test_provisioner(provider: Arc<FakeProvider>, store: Arc<MemoryStore>) -> Provisioner {
    let mut settings = ProvisioningConfig::default();
    settings.settle_delay = std::time::Duration::ZERO;
    Provisioner::builder()
        .inventory(Arc::new(InventoryCacheService::new(provider.clone())))
        .provider(provider)
        .store(store)
        .settings(settings)
        .build()
}

//! Batch VM creation.
//!
//! A request moves through `validate -> quota check -> name expansion -> create each unit`.
//! Units are created strictly in order. The first failure stops the batch; servers created before
//! it stay, and the error carries exactly which ones exist.

use bon::Builder;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, instrument, warn};

use crate::{
    config::ProvisioningConfig,
    db::models::user_defaults::UserDefaults,
    errors::{Error, Result},
    inventory::{InventoryCacheService, InventorySnapshot},
    provider::{CloudProvider, CreatedServer, ServerDetails, ServerQuota, ServerSpec},
    resolution::resolve_default,
    store::MappingStore,
    templates::AppTemplate,
    types::{OwnerId, abbrev_owner},
};

/// Largest number of servers one request may create
pub const MAX_BATCH_SIZE: u32 = 10;

/// A creation request as typed by the user
#[derive(Debug, Clone, Builder)]
pub struct ProvisionRequest {
    #[builder(into)]
    pub owner_id: OwnerId,
    #[builder(into)]
    pub name: String,
    #[builder(into)]
    pub location: String,
    #[builder(into)]
    pub image: String,
    /// App template key; `None` or empty means no template
    #[builder(into)]
    pub app: Option<String>,
    #[builder(default = 1)]
    pub count: u32,
}

/// A request whose shape has been checked; keys are trimmed and the template parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub owner_id: OwnerId,
    /// Trimmed and uppercased
    pub base_name: String,
    pub location: String,
    pub image: String,
    pub template: AppTemplate,
    pub count: u32,
}

impl ProvisionRequest {
    pub fn validate(&self) -> Result<ValidatedRequest> {
        let base_name = self.name.trim().to_uppercase();
        if base_name.is_empty() {
            return Err(Error::Validation {
                message: "Name can't be empty.".to_string(),
            });
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.count) {
            return Err(Error::Validation {
                message: format!("count must be between 1 and {MAX_BATCH_SIZE}."),
            });
        }
        let template = self.app.as_deref().unwrap_or_default().parse::<AppTemplate>()?;

        Ok(ValidatedRequest {
            owner_id: self.owner_id.clone(),
            base_name,
            location: self.location.trim().to_string(),
            image: self.image.trim().to_string(),
            template,
            count: self.count,
        })
    }
}

/// Reject the batch when a reported quota cannot hold it. No quota means no check.
pub fn check_quota(quota: Option<ServerQuota>, count: u32) -> Result<()> {
    let Some(quota) = quota else {
        return Ok(());
    };
    let remaining = quota.remaining();
    if remaining <= 0 || i64::from(count) > remaining {
        return Err(Error::QuotaExceeded {
            requested: count,
            remaining,
        });
    }
    Ok(())
}

/// `["WEB", "WEB1", "WEB2"]` for `("WEB", 3)`
pub fn expand_names(base: &str, count: u32) -> Vec<String> {
    (0..count)
        .map(|i| if i == 0 { base.to_string() } else { format!("{base}{i}") })
        .collect()
}

/// Servers created by a completed batch, in creation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub created: Vec<CreatedServer>,
}

#[derive(Builder)]
pub struct Provisioner {
    provider: Arc<dyn CloudProvider>,
    inventory: Arc<InventoryCacheService>,
    store: Arc<dyn MappingStore>,
    settings: ProvisioningConfig,
}

impl Provisioner {
    pub fn settings(&self) -> &ProvisioningConfig {
        &self.settings
    }

    /// Run a creation request to completion or to its first failure.
    ///
    /// Failures before the first server exists are returned as-is. Later failures are wrapped in
    /// [`Error::BatchAborted`] together with the servers that were created.
    #[instrument(skip(self, request), fields(owner = %abbrev_owner(&request.owner_id), name = %request.name, count = request.count), err)]
    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionReport> {
        let request = request.validate()?;

        let quota = match self.provider.server_quota().await {
            Ok(quota) => quota,
            Err(e) => {
                warn!("Could not read server quota, continuing without the check: {e}");
                None
            }
        };
        check_quota(quota, request.count)?;

        let names = expand_names(&request.base_name, request.count);
        let snapshot = self.inventory.get_or_build().await?;
        let defaults = self.store.get_defaults(&request.owner_id).await?;

        let mut created: Vec<CreatedServer> = Vec::with_capacity(names.len());
        for name in names {
            let server = match self.create_unit(&snapshot, &request, &defaults, &name).await {
                Ok(server) => server,
                Err(cause) => return Err(abort(created, name, cause)),
            };
            info!(server_id = server.id, name = %server.name, "Created server");
            created.push(server.clone());

            if let Err(e) = self.store.put_server(&request.owner_id, server.id, &server.name).await {
                return Err(abort(created, name, e.into()));
            }
        }

        Ok(ProvisionReport { created })
    }

    async fn create_unit(
        &self,
        snapshot: &InventorySnapshot,
        request: &ValidatedRequest,
        defaults: &UserDefaults,
        name: &str,
    ) -> Result<CreatedServer> {
        let machine_type = snapshot.resolve_machine_type(&self.settings.default_machine_type)?;
        let location = snapshot.resolve_location(&request.location)?;
        let image = snapshot.resolve_image(&request.image)?;
        let network = resolve_default("network", &snapshot.networks, defaults.network_id)?;
        let ssh_key = resolve_default("SSH key", &snapshot.ssh_keys, defaults.ssh_key_id)?;
        let firewall = resolve_default("firewall", &snapshot.firewalls, defaults.firewall_id)?;

        let labels = BTreeMap::from([
            ("managed_by".to_string(), self.settings.managed_by_label.clone()),
            ("owner_id".to_string(), request.owner_id.clone()),
        ]);

        let spec = ServerSpec::builder()
            .name(name)
            .machine_type(machine_type.name.as_str())
            .image_id(image.id)
            .location(location.name.as_str())
            .network_id(network.id)
            .ssh_key_id(ssh_key.id)
            .firewall_id(firewall.id)
            .maybe_boot_script(request.template.boot_script().map(str::to_string))
            .labels(labels)
            .build();

        self.provider.create_server(&spec).await.map_err(|source| Error::ProviderCreate {
            name: name.to_string(),
            source,
        })
    }

    /// Read back every created server. Failures are reported per server.
    #[instrument(skip_all, fields(count = created.len()))]
    pub async fn fetch_details(&self, created: &[CreatedServer]) -> Vec<Result<ServerDetails>> {
        let mut details = Vec::with_capacity(created.len());
        for server in created {
            let result = self
                .provider
                .get_server(server.id)
                .await
                .map_err(|source| Error::ProviderRead { id: server.id, source });
            if let Err(e) = &result {
                warn!("Created server {}, but fetching it failed: {e}", server.id);
            }
            details.push(result);
        }
        details
    }
}

fn abort(created: Vec<CreatedServer>, failed_name: String, cause: Error) -> Error {
    if created.is_empty() {
        return cause;
    }
    warn!(created = created.len(), failed = %failed_name, "Batch aborted: {cause}");
    Error::BatchAborted {
        created,
        failed_name,
        cause: Box::new(cause),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        provider::RESOURCE_LIMIT_EXCEEDED,
        test_utils::{FakeProvider, MemoryStore, sample_inventory, test_provisioner},
    };

    fn request(name: &str, count: u32) -> ProvisionRequest {
        ProvisionRequest::builder()
            .owner_id("1234")
            .name(name)
            .location("hel1")
            .image("ubuntu-24.04")
            .count(count)
            .build()
    }

    fn fixtures() -> (Arc<FakeProvider>, Arc<MemoryStore>, Provisioner) {
        let provider = Arc::new(FakeProvider::new(sample_inventory()));
        let store = Arc::new(MemoryStore::default());
        let provisioner = test_provisioner(provider.clone(), store.clone());
        (provider, store, provisioner)
    }

    async fn with_network_default(store: &MemoryStore) {
        store
            .set_defaults(
                "1234",
                UserDefaults {
                    network_id: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_expand_names() {
        assert_eq!(expand_names("WEB", 3), vec!["WEB", "WEB1", "WEB2"]);
        assert_eq!(expand_names("X", 1), vec!["X"]);
        assert_eq!(expand_names("DB", 10).last().unwrap(), "DB9");
    }

    #[test]
    fn test_validate_normalizes_request() {
        let validated = ProvisionRequest::builder()
            .owner_id("1")
            .name("  web ")
            .location(" hel1 ")
            .image(" ubuntu-24.04")
            .app(" Coolify ".to_string())
            .build()
            .validate()
            .unwrap();

        assert_eq!(validated.base_name, "WEB");
        assert_eq!(validated.location, "hel1");
        assert_eq!(validated.image, "ubuntu-24.04");
        assert_eq!(validated.template, AppTemplate::Coolify);
        assert_eq!(validated.count, 1);
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        assert!(matches!(request("   ", 1).validate(), Err(Error::Validation { .. })));
        assert!(matches!(request("WEB", 0).validate(), Err(Error::Validation { .. })));
        assert!(matches!(request("WEB", 11).validate(), Err(Error::Validation { .. })));
        assert!(request("WEB", 10).validate().is_ok());

        let mut bad_app = request("WEB", 1);
        bad_app.app = Some("docker".to_string());
        assert!(matches!(bad_app.validate(), Err(Error::UnknownTemplate { .. })));
    }

    #[test]
    fn test_check_quota() {
        assert!(check_quota(None, 10).is_ok());
        assert!(check_quota(Some(ServerQuota { max: 5, used: 2 }), 3).is_ok());
        assert!(matches!(
            check_quota(Some(ServerQuota { max: 5, used: 3 }), 3),
            Err(Error::QuotaExceeded { requested: 3, remaining: 2 })
        ));
        assert!(matches!(
            check_quota(Some(ServerQuota { max: 5, used: 5 }), 1),
            Err(Error::QuotaExceeded { remaining: 0, .. })
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_batch_creates_in_order_and_records() {
        let (provider, store, provisioner) = fixtures();
        with_network_default(&store).await;

        let report = provisioner.provision(&request("web", 3)).await.unwrap();

        let names: Vec<&str> = report.created.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["WEB", "WEB1", "WEB2"]);

        let specs = provider.created_specs();
        assert_eq!(specs.len(), 3);
        let spec = &specs[0];
        assert_eq!(spec.machine_type, "cx23");
        assert_eq!(spec.location, "hel1");
        assert_eq!(spec.image_id, 101);
        assert_eq!(spec.network_id, 2);
        assert_eq!(spec.ssh_key_id, 10);
        assert_eq!(spec.firewall_id, 20);
        assert_eq!(spec.boot_script, None);
        assert_eq!(spec.labels.get("managed_by").map(String::as_str), Some("vmctl"));
        assert_eq!(spec.labels.get("owner_id").map(String::as_str), Some("1234"));

        let recorded: Vec<_> = store.servers().into_iter().map(|(_, id, name)| (id, name)).collect();
        assert_eq!(
            recorded,
            report.created.iter().map(|s| (s.id, s.name.clone())).collect::<Vec<_>>()
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_quota_rejects_before_any_create() {
        let (provider, store, provisioner) = fixtures();
        with_network_default(&store).await;
        provider.set_quota(Some(ServerQuota { max: 10, used: 8 }));

        let err = provisioner.provision(&request("WEB", 3)).await.unwrap_err();

        assert!(matches!(err, Error::QuotaExceeded { requested: 3, remaining: 2 }));
        assert_eq!(provider.create_calls(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_unreadable_quota_fails_open() {
        let (provider, store, provisioner) = fixtures();
        with_network_default(&store).await;
        provider.fail_quota_read();

        let report = provisioner.provision(&request("WEB", 1)).await.unwrap();
        assert_eq!(report.created.len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_mid_batch_failure_reports_created_subset() {
        let (provider, store, provisioner) = fixtures();
        with_network_default(&store).await;
        provider.fail_create_at(2, "invalid_input", "name is already used");

        let err = provisioner.provision(&request("WEB", 3)).await.unwrap_err();

        match &err {
            Error::BatchAborted {
                created,
                failed_name,
                cause,
            } => {
                assert_eq!(created.len(), 1);
                assert_eq!(created[0].name, "WEB");
                assert_eq!(failed_name, "WEB1");
                assert!(matches!(**cause, Error::ProviderCreate { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_quota_exhausted());
        // the third unit is never attempted
        assert_eq!(provider.create_calls(), 2);
        assert_eq!(store.servers().len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_quota_exhaustion_mid_batch_is_classified() {
        let (provider, store, provisioner) = fixtures();
        with_network_default(&store).await;
        provider.fail_create_at(2, RESOURCE_LIMIT_EXCEEDED, "server limit reached");

        let err = provisioner.provision(&request("WEB", 3)).await.unwrap_err();

        assert!(err.is_quota_exhausted());
        assert!(err.user_message().contains("Created so far: WEB"));
    }

    #[test_log::test(tokio::test)]
    async fn test_first_unit_failure_is_not_wrapped() {
        let (provider, store, provisioner) = fixtures();
        with_network_default(&store).await;
        provider.fail_create_at(1, RESOURCE_LIMIT_EXCEEDED, "server limit reached");

        let err = provisioner.provision(&request("WEB", 2)).await.unwrap_err();

        assert!(matches!(err, Error::ProviderCreate { ref name, .. } if name == "WEB"));
        assert_eq!(err.user_message(), "Server limit reached on this account.");
        assert_eq!(provider.create_calls(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_arm_image_is_rejected_with_architecture() {
        let (provider, store, provisioner) = fixtures();
        with_network_default(&store).await;

        let mut req = request("WEB", 1);
        req.image = "ubuntu-arm".to_string();
        let err = provisioner.provision(&req).await.unwrap_err();

        assert!(matches!(err, Error::UnknownImage { architecture: Some(ref arch), .. } if arch == "arm"));
        assert!(err.user_message().contains("architecture: arm"));
        assert_eq!(provider.create_calls(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_ambiguous_network_without_default() {
        let (provider, _store, provisioner) = fixtures();

        let err = provisioner.provision(&request("WEB", 1)).await.unwrap_err();

        match err {
            Error::AmbiguousResource { category, candidates } => {
                assert_eq!(category, "network");
                assert_eq!(candidates, vec!["- backend (id 2)", "- frontend (id 1)"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.create_calls(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_template_becomes_boot_script() {
        let (provider, store, provisioner) = fixtures();
        with_network_default(&store).await;

        let mut req = request("VPN", 1);
        req.app = Some("wireguard".to_string());
        provisioner.provision(&req).await.unwrap();

        let spec = &provider.created_specs()[0];
        assert_eq!(spec.boot_script.as_deref(), AppTemplate::Wireguard.boot_script());
    }

    #[test_log::test(tokio::test)]
    async fn test_store_failure_after_create_still_reports_server() {
        let (provider, store, provisioner) = fixtures();
        with_network_default(&store).await;
        store.fail_writes();

        let err = provisioner.provision(&request("WEB", 3)).await.unwrap_err();

        match err {
            Error::BatchAborted { created, cause, .. } => {
                assert_eq!(created.len(), 1);
                assert!(matches!(*cause, Error::Database(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.create_calls(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_fetch_details_reports_each_server() {
        let (provider, store, provisioner) = fixtures();
        with_network_default(&store).await;

        let report = provisioner.provision(&request("WEB", 2)).await.unwrap();
        provider.fail_read(report.created[1].id);

        let details = provisioner.fetch_details(&report.created).await;
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].as_ref().unwrap().name, "WEB");
        assert!(matches!(details[1], Err(Error::ProviderRead { .. })));
    }
}

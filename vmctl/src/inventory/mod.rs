//! Provider inventory: an indexed, immutable snapshot of everything a server can be created from.
//!
//! [`InventorySnapshot::build`] lists every resource kind once and indexes it; the
//! [`cache::InventoryCacheService`] owns the active snapshot and decides when to rebuild.

use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, fmt};
use tracing::{info, instrument};

use crate::{
    errors::{Error, Result, SUGGESTION_LIMIT},
    provider::{CloudProvider, Firewall, Image, Location, MachineType, NamedResource, Network, ProviderError, SshKey},
    types::ResourceId,
};

pub mod cache;

pub use cache::{CacheState, InventoryCacheService};

/// Most entries an autocomplete answer holds
pub const AUTOCOMPLETE_LIMIT: usize = 25;

/// One complete view of the provider account.
///
/// Locations, machine types and images are keyed by name; networks, ssh keys and firewalls by id.
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    pub locations: BTreeMap<String, Location>,
    pub machine_types: BTreeMap<String, MachineType>,
    pub images: BTreeMap<String, Image>,
    /// Subset of `images` whose architecture is x86 compatible
    pub x86_images: BTreeMap<String, Image>,
    pub networks: BTreeMap<ResourceId, Network>,
    pub ssh_keys: BTreeMap<ResourceId, SshKey>,
    pub firewalls: BTreeMap<ResourceId, Firewall>,
    pub built_at: DateTime<Utc>,
}

/// Counts per mapping of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventorySummary {
    pub locations: usize,
    pub machine_types: usize,
    pub images: usize,
    pub x86_images: usize,
    pub networks: usize,
    pub ssh_keys: usize,
    pub firewalls: usize,
}

impl fmt::Display for InventorySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Locations: {}", self.locations)?;
        writeln!(f, "Server types: {}", self.machine_types)?;
        writeln!(f, "Images(all): {}", self.images)?;
        writeln!(f, "Images(x86): {}", self.x86_images)?;
        writeln!(f, "Networks: {}", self.networks)?;
        writeln!(f, "SSH keys: {}", self.ssh_keys)?;
        write!(f, "Firewalls: {}", self.firewalls)
    }
}

fn fetch_error(resource: &'static str) -> impl FnOnce(ProviderError) -> Error {
    move |source| Error::ProviderFetch { resource, source }
}

impl InventorySnapshot {
    /// List every resource kind from the provider and index the results.
    ///
    /// The listings run concurrently. Any failure abandons the whole build.
    #[instrument(skip(provider), err)]
    pub async fn build(provider: &dyn CloudProvider) -> Result<Self> {
        let (locations, machine_types, images, networks, ssh_keys, firewalls) = tokio::try_join!(
            async { provider.list_locations().await.map_err(fetch_error("locations")) },
            async { provider.list_machine_types().await.map_err(fetch_error("server types")) },
            async { provider.list_images().await.map_err(fetch_error("images")) },
            async { provider.list_networks().await.map_err(fetch_error("networks")) },
            async { provider.list_ssh_keys().await.map_err(fetch_error("ssh keys")) },
            async { provider.list_firewalls().await.map_err(fetch_error("firewalls")) },
        )?;

        let snapshot = Self::from_listings(locations, machine_types, images, networks, ssh_keys, firewalls);
        info!(summary = ?snapshot.summary(), "Built inventory snapshot");
        Ok(snapshot)
    }

    /// Index raw listings. Images without a name cannot be addressed and are skipped.
    pub fn from_listings(
        locations: Vec<Location>,
        machine_types: Vec<MachineType>,
        images: Vec<Image>,
        networks: Vec<Network>,
        ssh_keys: Vec<SshKey>,
        firewalls: Vec<Firewall>,
    ) -> Self {
        let mut all_images = BTreeMap::new();
        let mut x86_images = BTreeMap::new();
        for image in images {
            let Some(name) = image.name.clone() else {
                continue;
            };
            if image.is_x86() {
                x86_images.insert(name.clone(), image.clone());
            }
            all_images.insert(name, image);
        }

        Self {
            locations: locations.into_iter().map(|l| (l.name.clone(), l)).collect(),
            machine_types: machine_types.into_iter().map(|t| (t.name.clone(), t)).collect(),
            images: all_images,
            x86_images,
            networks: networks.into_iter().map(|n| (n.id, n)).collect(),
            ssh_keys: ssh_keys.into_iter().map(|k| (k.id, k)).collect(),
            firewalls: firewalls.into_iter().map(|f| (f.id, f)).collect(),
            built_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> InventorySummary {
        InventorySummary {
            locations: self.locations.len(),
            machine_types: self.machine_types.len(),
            images: self.images.len(),
            x86_images: self.x86_images.len(),
            networks: self.networks.len(),
            ssh_keys: self.ssh_keys.len(),
            firewalls: self.firewalls.len(),
        }
    }

    /// Sorted location names
    pub fn location_names(&self) -> Vec<String> {
        self.locations.keys().cloned().collect()
    }

    /// Sorted x86 image names
    pub fn x86_image_names(&self) -> Vec<String> {
        self.x86_images.keys().cloned().collect()
    }

    pub fn resolve_machine_type(&self, name: &str) -> Result<&MachineType> {
        let name = name.trim();
        self.machine_types.get(name).ok_or_else(|| Error::MachineTypeNotFound { name: name.to_string() })
    }

    pub fn resolve_location(&self, key: &str) -> Result<&Location> {
        let key = key.trim();
        self.locations.get(key).ok_or_else(|| Error::UnknownLocation {
            location: key.to_string(),
            available: self.locations.keys().take(SUGGESTION_LIMIT).cloned().collect(),
            total: self.locations.len(),
        })
    }

    /// Look up an x86 image by name. When the name exists with another architecture the error
    /// reports that architecture.
    pub fn resolve_image(&self, key: &str) -> Result<&Image> {
        let key = key.trim();
        if let Some(image) = self.x86_images.get(key) {
            return Ok(image);
        }
        Err(Error::UnknownImage {
            image: key.to_string(),
            architecture: self.images.get(key).map(Image::architecture_label),
            x86_images: self.x86_images.keys().take(SUGGESTION_LIMIT).cloned().collect(),
            total: self.x86_images.len(),
        })
    }
}

/// Autocomplete filter: case-insensitive substring match over `names`, capped at
/// [`AUTOCOMPLETE_LIMIT`]. Empty input returns the first entries.
pub fn suggest(names: &[String], current: &str) -> Vec<String> {
    let needle = current.trim().to_lowercase();
    names
        .iter()
        .filter(|name| needle.is_empty() || name.to_lowercase().contains(&needle))
        .take(AUTOCOMPLETE_LIMIT)
        .cloned()
        .collect()
}

/// `"- name (id N)"` lines sorted, `None` when the map is empty
pub fn resource_listing<T: NamedResource>(resources: &BTreeMap<ResourceId, T>) -> Option<String> {
    if resources.is_empty() {
        return None;
    }
    let mut lines: Vec<String> = resources.values().map(NamedResource::listing_line).collect();
    lines.sort();
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeProvider, sample_inventory};

    #[test]
    fn test_x86_images_are_filtered_subset() {
        let snapshot = sample_inventory();
        assert!(snapshot.x86_images.keys().all(|name| snapshot.images.contains_key(name)));
        assert!(snapshot.x86_images.values().all(Image::is_x86));
        assert!(snapshot.images.contains_key("ubuntu-arm"));
        assert!(!snapshot.x86_images.contains_key("ubuntu-arm"));
    }

    #[test]
    fn test_unnamed_images_are_skipped() {
        let snapshot = InventorySnapshot::from_listings(
            vec![],
            vec![],
            vec![Image {
                id: 9,
                name: None,
                description: Some("snapshot".to_string()),
                architecture: Some("x86".to_string()),
            }],
            vec![],
            vec![],
            vec![],
        );
        assert!(snapshot.images.is_empty());
        assert!(snapshot.x86_images.is_empty());
    }

    #[test]
    fn test_resolve_image_reports_foreign_architecture() {
        let snapshot = sample_inventory();

        let err = snapshot.resolve_image("ubuntu-arm").unwrap_err();
        match &err {
            Error::UnknownImage { architecture, .. } => assert_eq!(architecture.as_deref(), Some("arm")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("architecture: arm"));

        let err = snapshot.resolve_image("windows-3.11").unwrap_err();
        assert!(matches!(err, Error::UnknownImage { architecture: None, .. }));

        assert_eq!(snapshot.resolve_image(" ubuntu-24.04 ").unwrap().id, 101);
    }

    #[test]
    fn test_resolve_location_suggests_sorted_names() {
        let snapshot = sample_inventory();
        assert_eq!(snapshot.resolve_location("hel1 ").unwrap().name, "hel1");

        let err = snapshot.resolve_location("mars1").unwrap_err();
        match err {
            Error::UnknownLocation { available, total, .. } => {
                assert_eq!(available, vec!["fsn1", "hel1", "nbg1"]);
                assert_eq!(total, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_machine_type() {
        let snapshot = sample_inventory();
        assert_eq!(snapshot.resolve_machine_type("cx23").unwrap().name, "cx23");
        assert!(matches!(
            snapshot.resolve_machine_type("cx99"),
            Err(Error::MachineTypeNotFound { .. })
        ));
    }

    #[test]
    fn test_suggest_filters_case_insensitively() {
        let names: Vec<String> = ["debian-12", "Ubuntu-22.04", "ubuntu-24.04"].iter().map(|s| s.to_string()).collect();
        assert_eq!(suggest(&names, "UBU"), vec!["Ubuntu-22.04", "ubuntu-24.04"]);
        assert_eq!(suggest(&names, "  "), names);
        assert!(suggest(&names, "arch").is_empty());

        let many: Vec<String> = (0..40).map(|i| format!("img-{i:02}")).collect();
        assert_eq!(suggest(&many, "").len(), AUTOCOMPLETE_LIMIT);
    }

    #[test]
    fn test_resource_listing() {
        let snapshot = sample_inventory();
        assert_eq!(
            resource_listing(&snapshot.networks).unwrap(),
            "- backend (id 2)\n- frontend (id 1)"
        );
        assert_eq!(resource_listing(&BTreeMap::<ResourceId, Firewall>::new()), None);
    }

    #[test]
    fn test_summary_display() {
        let text = sample_inventory().summary().to_string();
        assert!(text.starts_with("Locations: 3\n"));
        assert!(text.contains("Images(x86): 2"));
        assert!(text.ends_with("Firewalls: 1"));
    }

    #[tokio::test]
    async fn test_build_names_failing_resource() {
        let provider = FakeProvider::new(sample_inventory());
        provider.fail_listing("firewalls");

        let err = InventorySnapshot::build(&provider).await.unwrap_err();
        assert!(matches!(err, Error::ProviderFetch { resource: "firewalls", .. }));
    }

    #[tokio::test]
    async fn test_build_indexes_everything() {
        let provider = FakeProvider::new(sample_inventory());

        let snapshot = InventorySnapshot::build(&provider).await.unwrap();
        assert_eq!(snapshot.summary(), sample_inventory().summary());
    }
}

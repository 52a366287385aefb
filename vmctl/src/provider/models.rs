//! Typed records for provider resources.
//!
//! Field names follow the Hetzner Cloud API so listings deserialize directly; anything the
//! provisioning core does not read is left out.

use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{ResourceId, ServerId};

/// A resource that can be picked by the default-resolution engine.
pub trait NamedResource {
    fn id(&self) -> ResourceId;
    fn name(&self) -> &str;

    /// Listing line in the form `"- name (id N)"`
    fn listing_line(&self) -> String {
        format!("- {} (id {})", self.name(), self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: ResourceId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub network_zone: Option<String>,
}

/// Server type in Hetzner terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineType {
    pub id: ResourceId,
    pub name: String,
    #[serde(default)]
    pub cores: Option<u32>,
    /// Memory in GB
    #[serde(default)]
    pub memory: Option<f64>,
    /// Disk size in GB
    #[serde(default)]
    pub disk: Option<u64>,
    #[serde(default)]
    pub architecture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: ResourceId,
    /// Snapshots and backups have no name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
}

impl Image {
    /// Lowercased architecture, or `"unknown"` when the provider did not report one.
    pub fn architecture_label(&self) -> String {
        self.architecture
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn is_x86(&self) -> bool {
        is_x86_architecture(&self.architecture_label())
    }
}

/// True for architecture strings containing "x86", "amd64" or "x86_64", case-insensitive.
pub fn is_x86_architecture(architecture: &str) -> bool {
    let arch = architecture.to_lowercase();
    arch.contains("x86") || arch.contains("amd64") || arch.contains("x86_64")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub id: ResourceId,
    pub name: String,
    #[serde(default)]
    pub ip_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshKey {
    pub id: ResourceId,
    pub name: String,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Firewall {
    pub id: ResourceId,
    pub name: String,
}

macro_rules! named_resource {
    ($($ty:ty),*) => {
        $(
            impl NamedResource for $ty {
                fn id(&self) -> ResourceId {
                    self.id
                }

                fn name(&self) -> &str {
                    &self.name
                }
            }
        )*
    };
}

named_resource!(Network, SshKey, Firewall);

/// Server quota of the account, when the provider exposes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerQuota {
    pub max: i64,
    pub used: i64,
}

impl ServerQuota {
    pub fn remaining(&self) -> i64 {
        self.max - self.used
    }
}

/// Fully resolved input of a single create call.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct ServerSpec {
    #[builder(into)]
    pub name: String,
    #[builder(into)]
    pub machine_type: String,
    pub image_id: ResourceId,
    #[builder(into)]
    pub location: String,
    pub network_id: ResourceId,
    pub ssh_key_id: ResourceId,
    pub firewall_id: ResourceId,
    /// cloud-init user data
    pub boot_script: Option<String>,
    #[builder(default)]
    pub labels: BTreeMap<String, String>,
}

/// What the provider returned for a successful create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedServer {
    pub id: ServerId,
    pub name: String,
}

/// Server state read back after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDetails {
    pub id: ServerId,
    pub name: String,
    pub status: String,
    pub machine_type: String,
    pub datacenter: Option<String>,
    pub location: Option<String>,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub image: Option<String>,
}

impl ServerDetails {
    /// Multi-line summary shown to the user once a server is ready.
    pub fn summary(&self) -> String {
        let na = "N/A";
        [
            format!("VM Ready: {}", self.name),
            format!("Server ID: {}", self.id),
            format!("Status: {}", self.status),
            format!("Type: {}", self.machine_type),
            format!(
                "Location: {} ({})",
                self.datacenter.as_deref().unwrap_or(na),
                self.location.as_deref().unwrap_or(na)
            ),
            format!("IPv4: {}", self.ipv4.as_deref().unwrap_or(na)),
            format!("IPv6: {}", self.ipv6.as_deref().unwrap_or(na)),
            format!("Image: {}", self.image.as_deref().unwrap_or(na)),
        ]
        .join("\n")
    }
}

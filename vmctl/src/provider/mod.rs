//! Cloud provider abstraction.
//!
//! The provisioning core talks to the provider only through [`CloudProvider`]. The trait bundles
//! the four capabilities the core needs: inventory listings, server creation, reading a server
//! back, and a best-effort quota read. [`hetzner::HetznerClient`] is the production
//! implementation; tests use the in-memory fake in `test_utils`.

use async_trait::async_trait;

pub mod hetzner;
pub mod models;

pub use models::{
    CreatedServer, Firewall, Image, Location, MachineType, NamedResource, Network, ServerDetails, ServerQuota, ServerSpec, SshKey,
};

use crate::types::ServerId;

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Structured error code the provider uses when the account cannot hold more servers.
pub const RESOURCE_LIMIT_EXCEEDED: &str = "resource_limit_exceeded";

/// Errors returned by provider calls
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The API answered with an error document
    #[error("{message} ({code}, HTTP {status})")]
    Api { status: u16, code: String, message: String },

    #[error("Provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid provider URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Failed to decode provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether this error means the account ran out of server quota.
    ///
    /// Checks the structured error code first. The text fallback is best effort: it only
    /// catches providers or proxies that report the limit in prose.
    pub fn is_resource_limit(&self) -> bool {
        if let ProviderError::Api { code, .. } = self
            && code == RESOURCE_LIMIT_EXCEEDED
        {
            return true;
        }
        let text = self.to_string().to_lowercase();
        text.contains(RESOURCE_LIMIT_EXCEEDED) || text.contains("server limit reached") || text.contains("limit reached")
    }
}

/// Read/create access to the provider account.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn list_locations(&self) -> Result<Vec<Location>>;

    async fn list_machine_types(&self) -> Result<Vec<MachineType>>;

    async fn list_images(&self) -> Result<Vec<Image>>;

    async fn list_networks(&self) -> Result<Vec<Network>>;

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>>;

    async fn list_firewalls(&self) -> Result<Vec<Firewall>>;

    /// Create one server. Returns the provider-assigned id and name.
    async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer>;

    /// Read the current state of a server
    async fn get_server(&self, id: ServerId) -> Result<ServerDetails>;

    /// Remaining-server quota of the account.
    ///
    /// `Ok(None)` means the provider does not expose it; callers treat errors the same way.
    async fn server_quota(&self) -> Result<Option<ServerQuota>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: &str, message: &str) -> ProviderError {
        ProviderError::Api {
            status: 403,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_resource_limit_from_code() {
        assert!(api_error(RESOURCE_LIMIT_EXCEEDED, "nope").is_resource_limit());
    }

    #[test]
    fn test_resource_limit_from_text() {
        assert!(api_error("forbidden", "Server limit reached for project").is_resource_limit());
        assert!(ProviderError::Decode("limit reached".to_string()).is_resource_limit());
    }

    #[test]
    fn test_other_errors_are_not_resource_limit() {
        assert!(!api_error("invalid_input", "invalid name").is_resource_limit());
        assert!(!ProviderError::Decode("unexpected EOF".to_string()).is_resource_limit());
    }
}

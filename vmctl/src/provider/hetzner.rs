//! Hetzner Cloud implementation of [`CloudProvider`].

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::{
    CloudProvider, CreatedServer, Firewall, Image, Location, MachineType, Network, ProviderError, Result, ServerDetails, ServerSpec,
    SshKey,
};
use crate::config::ProviderConfig;
use crate::types::ServerId;

/// Talks to the Hetzner Cloud REST API with a project token.
pub struct HetznerClient {
    client: Client,
    base_url: Url,
    api_token: String,
    page_size: u32,
    request_timeout: Duration,
}

impl HetznerClient {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let api_token = config
            .api_token
            .clone()
            .context("provider.api_token is required to talk to the Hetzner API")?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: ensure_slash(&config.api_url),
            api_token,
            page_size: config.page_size,
            request_timeout: config.request_timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Fetch every page of a listing endpoint.
    ///
    /// Listing documents carry the items under `key` and the next page number under
    /// `meta.pagination.next_page` (null on the last page).
    #[instrument(skip(self))]
    async fn list_all<T: DeserializeOwned>(&self, path: &str, key: &str) -> Result<Vec<T>> {
        let url = self.endpoint(path)?;
        let mut items = Vec::new();
        let mut page: u64 = 1;

        loop {
            let response = self
                .client
                .get(url.clone())
                .bearer_auth(&self.api_token)
                .query(&[("page", page), ("per_page", u64::from(self.page_size))])
                .timeout(self.request_timeout)
                .send()
                .await?;

            let mut body: Value = read_json(response).await?;
            let batch = body
                .get_mut(key)
                .map(Value::take)
                .ok_or_else(|| ProviderError::Decode(format!("missing `{key}` in {path} listing")))?;
            let batch: Vec<T> = serde_json::from_value(batch).map_err(|e| ProviderError::Decode(format!("{path} listing: {e}")))?;
            debug!("Fetched {} {} from page {}", batch.len(), key, page);
            items.extend(batch);

            match body.pointer("/meta/pagination/next_page").and_then(Value::as_u64) {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(items)
    }
}

/// Makes sure a url has a trailing slash.
///
/// `Url::join` replaces the last path segment unless the base ends with '/', so
/// `https://api.hetzner.cloud/v1` joined with `servers` would lose the `v1`.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Turn a response into `T`, or into [`ProviderError::Api`] for non-2xx statuses.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.error.code, envelope.error.message),
            Err(_) => ("unknown".to_string(), body),
        };
        tracing::error!("Hetzner API error {}: {} ({})", status, message, code);
        return Err(ProviderError::Api {
            status: status.as_u16(),
            code,
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::error!("Failed to parse Hetzner response as JSON. Error: {}", e);
        tracing::debug!("Response body was: {}", body);
        ProviderError::Decode(e.to_string())
    })
}

#[derive(Deserialize)]
struct ServerEnvelope {
    server: WireServer,
}

#[derive(Deserialize)]
struct WireServer {
    id: ServerId,
    name: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    server_type: Option<NameRef>,
    #[serde(default)]
    datacenter: Option<WireDatacenter>,
    #[serde(default)]
    public_net: Option<WirePublicNet>,
    #[serde(default)]
    image: Option<NameRef>,
}

#[derive(Deserialize)]
struct NameRef {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct WireDatacenter {
    name: String,
    #[serde(default)]
    location: Option<NameRef>,
}

#[derive(Deserialize)]
struct WirePublicNet {
    #[serde(default)]
    ipv4: Option<IpRef>,
    #[serde(default)]
    ipv6: Option<IpRef>,
}

#[derive(Deserialize)]
struct IpRef {
    ip: String,
}

impl From<WireServer> for ServerDetails {
    fn from(server: WireServer) -> Self {
        let (datacenter, location) = match server.datacenter {
            Some(dc) => (Some(dc.name), dc.location.and_then(|l| l.name)),
            None => (None, None),
        };
        let (ipv4, ipv6) = match server.public_net {
            Some(net) => (net.ipv4.map(|ip| ip.ip), net.ipv6.map(|ip| ip.ip)),
            None => (None, None),
        };
        Self {
            id: server.id,
            name: server.name,
            status: server.status.unwrap_or_else(|| "unknown".to_string()),
            machine_type: server.server_type.and_then(|t| t.name).unwrap_or_else(|| "unknown".to_string()),
            datacenter,
            location,
            ipv4,
            ipv6,
            image: server.image.and_then(|i| i.name),
        }
    }
}

fn create_body(spec: &ServerSpec) -> Value {
    let mut body = json!({
        "name": spec.name,
        "server_type": spec.machine_type,
        "image": spec.image_id.to_string(),
        "location": spec.location,
        "networks": [spec.network_id],
        "ssh_keys": [spec.ssh_key_id],
        "firewalls": [{ "firewall": spec.firewall_id }],
        "labels": spec.labels,
        "start_after_create": true,
    });
    if let Some(script) = &spec.boot_script {
        body["user_data"] = Value::String(script.clone());
    }
    body
}

#[async_trait]
impl CloudProvider for HetznerClient {
    async fn list_locations(&self) -> Result<Vec<Location>> {
        self.list_all("locations", "locations").await
    }

    async fn list_machine_types(&self) -> Result<Vec<MachineType>> {
        self.list_all("server_types", "server_types").await
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        self.list_all("images", "images").await
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        self.list_all("networks", "networks").await
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        self.list_all("ssh_keys", "ssh_keys").await
    }

    async fn list_firewalls(&self) -> Result<Vec<Firewall>> {
        self.list_all("firewalls", "firewalls").await
    }

    #[instrument(skip(self, spec), fields(name = %spec.name, location = %spec.location), err)]
    async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer> {
        let response = self
            .client
            .post(self.endpoint("servers")?)
            .bearer_auth(&self.api_token)
            .json(&create_body(spec))
            .timeout(self.request_timeout)
            .send()
            .await?;

        let envelope: ServerEnvelope = read_json(response).await?;
        Ok(CreatedServer {
            id: envelope.server.id,
            name: envelope.server.name,
        })
    }

    #[instrument(skip(self), err)]
    async fn get_server(&self, id: ServerId) -> Result<ServerDetails> {
        let response = self
            .client
            .get(self.endpoint(&format!("servers/{id}"))?)
            .bearer_auth(&self.api_token)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let envelope: ServerEnvelope = read_json(response).await?;
        Ok(envelope.server.into())
    }

    // The public API has no account-limits endpoint; keep the trait default (quota unknown).
}

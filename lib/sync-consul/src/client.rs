//! Consul agent client implementing the sync `Registry`

use crate::config::ConsulConfig;
use async_trait::async_trait;
use reqwest::{IntoUrl, Method, RequestBuilder, Response, Url};
use serde::Deserialize;
use std::collections::HashMap;
use sync_core::{Endpoint, Registry, RegistryError};
use tracing::debug;

/// Meta key marking instances owned by this sync
pub const META_EXTERNAL_SOURCE: &str = "external-source";
/// Meta value of `META_EXTERNAL_SOURCE`
pub const EXTERNAL_SOURCE: &str = "kubernetes";
/// Meta key holding the backing object name
pub const META_REF_NAME: &str = "k8s-ref";

/// ConsulRegistry registers endpoints as services on a Consul agent
pub struct ConsulRegistry {
    config: ConsulConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for ConsulRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsulRegistry")
            .field("address", &self.config.address)
            .field("client", &"<reqwest::Client>")
            .finish()
    }
}

/// Service entry as returned by `/v1/agent/services`
#[derive(Debug, Deserialize)]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Port", default)]
    port: u16,
    #[serde(rename = "Tags", default)]
    tags: Option<Vec<String>>,
    #[serde(rename = "Meta", default)]
    meta: Option<HashMap<String, String>>,
}

impl ConsulRegistry {
    pub fn new(config: ConsulConfig) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| RegistryError::Request(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ConsulConfig {
        &self.config
    }

    fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        let mut request = self.client.request(method, url);
        if let Some(token) = &self.config.token {
            request = request.header("X-Consul-Token", token);
        }
        request
    }

    async fn send(request: RequestBuilder) -> Result<Response, RegistryError> {
        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Agent registration payload for an endpoint
pub fn registration_body(endpoint: &Endpoint) -> serde_json::Value {
    let mut service = serde_json::json!({
        "ID": endpoint.id(),
        "Name": endpoint.name,
        "Address": endpoint.address,
        "Port": endpoint.port,
        "Tags": endpoint.tags,
        "Meta": {
            META_EXTERNAL_SOURCE: EXTERNAL_SOURCE,
            META_REF_NAME: endpoint.ref_name,
        },
    });

    if let Some(check) = &endpoint.health_check {
        service["Check"] = serde_json::json!({
            "HTTP": check.url,
            "Interval": check.interval,
            "Timeout": check.timeout,
            "TLSSkipVerify": false,
        });
    }

    service
}

/// Deregistration URL with `id` percent-encoded as a single path segment
fn deregister_url(config: &ConsulConfig, id: &str) -> Result<Url, RegistryError> {
    let mut url = Url::parse(&config.url("/v1/agent/service/deregister"))
        .map_err(|e| RegistryError::Request(format!("invalid Consul address: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| RegistryError::Request(format!("invalid Consul address: {}", config.address)))?
        .push(id);
    Ok(url)
}

/// Instances of `service` owned by this sync in an `/v1/agent/services` body
fn parse_services(body: &str, service: &str) -> Result<Vec<Endpoint>, RegistryError> {
    let services: HashMap<String, AgentService> = serde_json::from_str(body)?;

    let mut owned: Vec<AgentService> = services
        .into_values()
        .filter(|s| s.service == service)
        .filter(|s| {
            s.meta
                .as_ref()
                .and_then(|m| m.get(META_EXTERNAL_SOURCE))
                .is_some_and(|source| source == EXTERNAL_SOURCE)
        })
        .collect();
    owned.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(owned
        .into_iter()
        .map(|s| {
            let ref_name = s
                .meta
                .as_ref()
                .and_then(|m| m.get(META_REF_NAME))
                .cloned()
                .unwrap_or_default();
            Endpoint::new(s.service, s.address, s.port, ref_name, s.tags.unwrap_or_default(), None)
        })
        .collect())
}

#[async_trait]
impl Registry for ConsulRegistry {
    async fn register(&self, endpoint: &Endpoint) -> Result<(), RegistryError> {
        let request = self
            .request(Method::PUT, self.config.url("/v1/agent/service/register"))
            .json(&registration_body(endpoint));
        Self::send(request).await?;

        debug!("Registered {} with Consul", endpoint.id());
        Ok(())
    }

    async fn list_registered(&self, service: &str) -> Result<Vec<Endpoint>, RegistryError> {
        let request = self.request(Method::GET, self.config.url("/v1/agent/services"));
        let response = Self::send(request).await?;
        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;
        parse_services(&body, service)
    }

    async fn deregister(&self, endpoint: &Endpoint) -> Result<(), RegistryError> {
        let url = deregister_url(&self.config, &endpoint.id())?;
        Self::send(self.request(Method::PUT, url)).await?;

        debug!("Deregistered {} from Consul", endpoint.id());
        Ok(())
    }
}

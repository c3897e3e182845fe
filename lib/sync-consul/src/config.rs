//! Consul connection configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Consul agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsulConfig {
    /// Consul HTTP API address
    #[serde(default = "default_consul_address")]
    pub address: String,
    /// ACL token sent as `X-Consul-Token`
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_consul_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(default = "default_consul_request_timeout")]
    pub request_timeout: Duration,
}

fn default_consul_address() -> String {
    "http://127.0.0.1:8500".to_string()
}

fn default_consul_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_consul_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl ConsulConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Absolute URL for an API path such as `/v1/agent/services`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address.trim_end_matches('/'), path)
    }
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: default_consul_address(),
            token: None,
            connect_timeout: default_consul_connect_timeout(),
            request_timeout: default_consul_request_timeout(),
        }
    }
}

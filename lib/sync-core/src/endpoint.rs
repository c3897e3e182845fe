//! Endpoint management
use serde::{Deserialize, Serialize};

/// A single registry-ready service instance derived from an Endpoints address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Resolved service name, never empty
    pub name: String,
    pub address: String,
    pub port: u16,
    /// Name of the object backing this address, empty when unknown
    #[serde(default)]
    pub ref_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
}

/// Health check definition handed to the registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub url: String,
    pub interval: String,
    pub timeout: String,
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        ref_name: impl Into<String>,
        tags: Vec<String>,
        health_check: Option<HealthCheck>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            ref_name: ref_name.into(),
            tags,
            health_check,
        }
    }

    /// Registry instance ID, unique per service/address/port
    pub fn id(&self) -> String {
        format!("{}-{}-{}", self.name, self.address, self.port)
    }

    /// Whether both endpoints denote the same instance of a service
    pub fn same_instance(&self, other: &Endpoint) -> bool {
        self.name == other.name && self.address == other.address && self.port == other.port
    }
}

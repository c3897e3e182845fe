//! Registry seam and an in-memory registry

use crate::{Endpoint, RegistryError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// External service registry the reconciler writes to
#[async_trait]
pub trait Registry: Send + Sync {
    /// Register or update an instance
    async fn register(&self, endpoint: &Endpoint) -> Result<(), RegistryError>;

    /// Instances currently registered under `service`
    async fn list_registered(&self, service: &str) -> Result<Vec<Endpoint>, RegistryError>;

    /// Remove an instance
    async fn deregister(&self, endpoint: &Endpoint) -> Result<(), RegistryError>;
}

/// InMemoryRegistry keeps registered instances per service name
pub struct InMemoryRegistry {
    // Map of service name to its instances
    services: Arc<RwLock<HashMap<String, Vec<Endpoint>>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// List all service names
    pub async fn list_services(&self) -> Vec<String> {
        let services = self.services.read().await;
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get count of registered instances across all services
    pub async fn instance_count(&self) -> usize {
        let services = self.services.read().await;
        services.values().map(Vec::len).sum()
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn register(&self, endpoint: &Endpoint) -> Result<(), RegistryError> {
        let mut services = self.services.write().await;
        let instances = services.entry(endpoint.name.clone()).or_default();
        match instances.iter_mut().find(|e| e.same_instance(endpoint)) {
            Some(existing) => *existing = endpoint.clone(),
            None => instances.push(endpoint.clone()),
        }

        debug!("Registered instance: {}", endpoint.id());
        Ok(())
    }

    async fn list_registered(&self, service: &str) -> Result<Vec<Endpoint>, RegistryError> {
        let services = self.services.read().await;
        Ok(services.get(service).cloned().unwrap_or_default())
    }

    async fn deregister(&self, endpoint: &Endpoint) -> Result<(), RegistryError> {
        let mut services = self.services.write().await;
        if let Some(instances) = services.get_mut(&endpoint.name) {
            instances.retain(|e| !e.same_instance(endpoint));
            if instances.is_empty() {
                services.remove(&endpoint.name);
            }
        }

        debug!("Deregistered instance: {}", endpoint.id());
        Ok(())
    }
}

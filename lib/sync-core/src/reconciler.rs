//! Reconciliation of a registry against derived endpoints
//!
//! A pass registers every derived endpoint, then prunes, per service name,
//! registered instances that are no longer derived. A registration failure
//! aborts the pass before pruning. Pruning attempts every service and reports
//! all failures together; completed registrations are never rolled back.
//!
//! Passes for the same object must be serialized by the caller.

use crate::aggregator::{DerivedEndpoints, EndpointAggregator};
use crate::config::SyncOptions;
use crate::endpoint::Endpoint;
use crate::error::{CoreError, PruneFailure, RegistryError, Result};
use crate::registry::Registry;
use k8s_openapi::api::core::v1::Endpoints;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a successful reconciliation pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub registered: usize,
    pub removed: usize,
    pub services: usize,
}

/// Reconciler drives a `Registry` from Endpoints objects
pub struct Reconciler {
    registry: Arc<dyn Registry>,
    aggregator: EndpointAggregator,
}

impl Reconciler {
    pub fn new(registry: Arc<dyn Registry>, options: SyncOptions) -> Self {
        Self {
            registry,
            aggregator: EndpointAggregator::new(options),
        }
    }

    /// Desired state for `object`
    pub fn derive(&self, object: &Endpoints) -> DerivedEndpoints {
        self.aggregator.derive(object)
    }

    /// Make the registry reflect the current state of `object`
    pub async fn reconcile(&self, object: &Endpoints) -> Result<ReconcileSummary> {
        let object_name = object_name(object);
        let derived = self.derive(object);

        for endpoint in &derived.endpoints {
            self.registry
                .register(endpoint)
                .await
                .map_err(|source| CoreError::Registration {
                    object: object_name.to_string(),
                    source,
                })?;
            debug!("Registered {} for {}", endpoint.id(), object_name);
        }

        let mut removed = 0;
        let mut failures = Vec::new();
        for (service, desired) in &derived.per_service {
            match self.remove_deleted_endpoints(service, desired).await {
                Ok(count) => removed += count,
                Err(source) => failures.push(PruneFailure {
                    service: service.clone(),
                    source,
                }),
            }
        }
        if !failures.is_empty() {
            return Err(CoreError::Prune(failures));
        }

        let summary = ReconcileSummary {
            registered: derived.endpoints.len(),
            removed,
            services: derived.per_service.len(),
        };
        info!(
            "Reconciled {}: {} registered, {} removed across {} services",
            object_name, summary.registered, summary.removed, summary.services
        );
        Ok(summary)
    }

    /// Deregister every endpoint `object` derives to, used once it is deleted
    pub async fn remove(&self, object: &Endpoints) -> Result<usize> {
        let object_name = object_name(object);
        let derived = self.derive(object);

        for endpoint in &derived.endpoints {
            self.registry
                .deregister(endpoint)
                .await
                .map_err(|source| CoreError::Removal {
                    object: object_name.to_string(),
                    source,
                })?;
            debug!("Deregistered {} of deleted {}", endpoint.id(), object_name);
        }

        info!("Removed {} endpoints of deleted {}", derived.endpoints.len(), object_name);
        Ok(derived.endpoints.len())
    }

    /// Deregister instances of `service` that are not in `desired`
    async fn remove_deleted_endpoints(
        &self,
        service: &str,
        desired: &[Endpoint],
    ) -> std::result::Result<usize, RegistryError> {
        let registered = self.registry.list_registered(service).await?;

        let mut removed = 0;
        for stale in registered
            .iter()
            .filter(|r| !desired.iter().any(|d| d.same_instance(r)))
        {
            self.registry.deregister(stale).await?;
            debug!("Removed stale instance {}", stale.id());
            removed += 1;
        }
        Ok(removed)
    }
}

fn object_name(object: &Endpoints) -> &str {
    object.metadata.name.as_deref().unwrap_or_default()
}

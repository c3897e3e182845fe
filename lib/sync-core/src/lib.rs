//! Endpoint derivation and registry reconciliation
//!
//! This library provides:
//! - Per-port metadata resolution from Endpoints labels and annotations
//! - Health check synthesis from that metadata
//! - Derivation of registry-ready endpoints grouped by service name
//! - Reconciliation of a registry against the derived endpoints

pub mod aggregator;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod health_check;
pub mod metadata;
pub mod reconciler;
pub mod registry;

pub use aggregator::{DerivedEndpoints, EndpointAggregator};
pub use config::SyncOptions;
pub use endpoint::{Endpoint, HealthCheck};
pub use error::{CoreError, PruneFailure, RegistryError, Result};
pub use metadata::ServiceMetadata;
pub use reconciler::{ReconcileSummary, Reconciler};
pub use registry::{InMemoryRegistry, Registry};

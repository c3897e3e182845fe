//! Prometheus metrics for the sync loop

use anyhow::Result;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Counters describing reconciliation activity
#[derive(Clone)]
pub struct SyncMetrics {
    /// Reconciliation passes by result
    pub reconciliations_total: CounterVec,
    pub endpoints_registered_total: Counter,
    pub endpoints_removed_total: Counter,
    /// Errors reported by the Kubernetes watch stream
    pub watch_errors_total: Counter,
    registry: Arc<Registry>,
}

impl SyncMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let reconciliations_total = CounterVec::new(
            Opts::new(
                "kube2consul_reconciliations_total",
                "Reconciliation passes by result",
            ),
            &["result"],
        )?;
        let endpoints_registered_total = Counter::new(
            "kube2consul_endpoints_registered_total",
            "Endpoints registered with the registry",
        )?;
        let endpoints_removed_total = Counter::new(
            "kube2consul_endpoints_removed_total",
            "Endpoints removed from the registry",
        )?;
        let watch_errors_total = Counter::new(
            "kube2consul_watch_errors_total",
            "Errors from the Endpoints watch",
        )?;

        registry.register(Box::new(reconciliations_total.clone()))?;
        registry.register(Box::new(endpoints_registered_total.clone()))?;
        registry.register(Box::new(endpoints_removed_total.clone()))?;
        registry.register(Box::new(watch_errors_total.clone()))?;

        Ok(Self {
            reconciliations_total,
            endpoints_registered_total,
            endpoints_removed_total,
            watch_errors_total,
            registry,
        })
    }

    pub fn record_success(&self, registered: usize, removed: usize) {
        self.reconciliations_total.with_label_values(&["success"]).inc();
        self.endpoints_registered_total.inc_by(registered as f64);
        self.endpoints_removed_total.inc_by(removed as f64);
    }

    pub fn record_failure(&self) {
        self.reconciliations_total.with_label_values(&["error"]).inc();
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_success() {
        let metrics = SyncMetrics::new().expect("Failed to create metrics");
        metrics.record_success(3, 1);
        metrics.record_success(2, 0);

        assert_eq!(metrics.reconciliations_total.with_label_values(&["success"]).get(), 2.0);
        assert_eq!(metrics.endpoints_registered_total.get(), 5.0);
        assert_eq!(metrics.endpoints_removed_total.get(), 1.0);
    }

    #[test]
    fn test_gather() {
        let metrics = SyncMetrics::new().expect("Failed to create metrics");
        metrics.record_failure();

        let text = metrics.gather().expect("Failed to gather metrics");
        assert!(text.contains("kube2consul_reconciliations_total{result=\"error\"} 1"));
        assert!(text.contains("kube2consul_endpoints_registered_total 0"));
    }
}

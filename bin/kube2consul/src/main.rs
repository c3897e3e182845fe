use anyhow::Result;
use k8s_openapi::api::core::v1::Endpoints;
use kube::{Api, Client};
use std::sync::Arc;
use sync_consul::ConsulRegistry;
use sync_core::{InMemoryRegistry, Reconciler, Registry};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod http;
mod metrics;
mod watch;

use config::{Config, LogFormat};
use metrics::SyncMetrics;
use watch::EventHandler;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    info!("Starting kube2consul...");

    let registry: Arc<dyn Registry> = if config.dry_run {
        warn!("Dry run: endpoints are registered in memory only");
        Arc::new(InMemoryRegistry::new())
    } else {
        info!("Registering with Consul at {}", config.consul.address);
        Arc::new(ConsulRegistry::new(config.consul.clone())?)
    };
    if config.sync.explicit {
        info!("Explicit mode: only ports with a SERVICE_NAME are registered");
    }

    let metrics = Arc::new(SyncMetrics::new()?);
    let handler = Arc::new(EventHandler::new(
        Reconciler::new(registry, config.sync.clone()),
        metrics.clone(),
    ));

    let client = Client::try_default().await?;
    let api: Api<Endpoints> = match &config.namespace {
        Some(namespace) => {
            info!("Watching Endpoints in namespace {}", namespace);
            Api::namespaced(client, namespace)
        }
        None => Api::all(client),
    };

    let metrics_addr = config.metrics_addr;
    tokio::spawn(async move {
        if let Err(e) = http::serve(metrics_addr, metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    tokio::select! {
        result = watch::run(api, handler, config.retry_delay) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received, exiting..."),
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

//! Daemon configuration read from the environment

use std::net::SocketAddr;
use std::time::Duration;
use sync_consul::ConsulConfig;
use sync_core::SyncOptions;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub consul: ConsulConfig,
    pub sync: SyncOptions,
    /// Namespace to watch, all namespaces when unset
    pub namespace: Option<String>,
    pub metrics_addr: SocketAddr,
    /// Delay before a failed sync is retried
    pub retry_delay: Duration,
    /// Register into an in-memory registry instead of Consul
    pub dry_run: bool,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut consul = ConsulConfig::default();
        if let Some(address) = var("CONSUL_HTTP_ADDR") {
            consul.address = normalize_address(&address);
        }
        consul.token = var("CONSUL_HTTP_TOKEN");
        if let Some(timeout) = var("K2C_CONSUL_TIMEOUT_SECS") {
            let secs = timeout.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                name: "K2C_CONSUL_TIMEOUT_SECS",
                value: timeout.clone(),
            })?;
            consul.request_timeout = Duration::from_secs(secs);
        }

        let metrics_addr = match var("K2C_METRICS_ADDR") {
            Some(addr) => addr.parse().map_err(|_| ConfigError::InvalidValue {
                name: "K2C_METRICS_ADDR",
                value: addr.clone(),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 9090)),
        };

        let retry_delay = match var("K2C_RETRY_SECS") {
            Some(secs) => match secs.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "K2C_RETRY_SECS",
                        value: secs,
                    })
                }
            },
            None => Duration::from_secs(30),
        };

        let log_format = match var("K2C_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "K2C_LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            consul,
            sync: SyncOptions {
                explicit: parse_bool("K2C_EXPLICIT", var("K2C_EXPLICIT"))?,
            },
            namespace: var("K2C_NAMESPACE"),
            metrics_addr,
            retry_delay,
            dry_run: parse_bool("K2C_DRY_RUN", var("K2C_DRY_RUN"))?,
            log_format,
        })
    }
}

fn parse_bool(name: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(false);
    };
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { name, value }),
    }
}

// CONSUL_HTTP_ADDR is commonly given without a scheme
fn normalize_address(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

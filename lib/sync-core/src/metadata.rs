//! Per-port service metadata resolved from Endpoints labels and annotations
//!
//! Keys are read from `SERVICE_<KEY>` entries, lower-cased after the prefix.
//! `SERVICE_<PORT>_<KEY>` applies to a single port and always wins over the
//! object-level `SERVICE_<KEY>`. Annotations override labels.

use k8s_openapi::api::core::v1::Endpoints;
use std::collections::{BTreeMap, HashMap, HashSet};

const KEY_PREFIX: &str = "SERVICE_";

/// Metadata scoped to one port of an Endpoints object
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceMetadata {
    values: HashMap<String, String>,
    from_port: HashSet<String>,
}

impl ServiceMetadata {
    /// Resolve metadata of `endpoints` for `port` (the numeric port as a string)
    pub fn resolve(endpoints: &Endpoints, port: &str) -> Self {
        let mut metadata = Self::default();
        let sources = [
            endpoints.metadata.labels.as_ref(),
            endpoints.metadata.annotations.as_ref(),
        ];
        for source in sources.into_iter().flatten() {
            metadata.merge(source, port);
        }
        metadata
    }

    fn merge(&mut self, source: &BTreeMap<String, String>, port: &str) {
        for (raw_key, value) in source {
            let Some(key) = raw_key.strip_prefix(KEY_PREFIX) else {
                continue;
            };
            let key = key.to_lowercase();

            match port_scoped(&key) {
                Some((key_port, port_key)) => {
                    if key_port != port {
                        continue;
                    }
                    self.values.insert(port_key.clone(), value.clone());
                    self.from_port.insert(port_key);
                }
                None => {
                    if self.from_port.contains(&key) {
                        continue;
                    }
                    self.values.insert(key, value.clone());
                }
            }
        }
    }

    /// Value of `key`, or `default` when it is missing or empty
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.values.get(key) {
            Some(value) if !value.is_empty() => value.as_str(),
            _ => default,
        }
    }

    /// Non-empty value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Comma-delimited `tags`, in listed order
    pub fn tags(&self) -> Vec<String> {
        match self.get("tags") {
            Some(tags) => tags.split(',').map(str::to_string).collect(),
            None => Vec::new(),
        }
    }

    /// Whether `key` came from a port-scoped entry
    pub fn is_port_specific(&self, key: &str) -> bool {
        self.from_port.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Split `<port>_<key>` into its port and key
fn port_scoped(key: &str) -> Option<(String, String)> {
    let (port, key) = key.split_once('_')?;
    if port.is_empty() || key.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((port.to_string(), key.to_string()))
}

//! Derivation of registry endpoints from a Kubernetes Endpoints object

use crate::config::SyncOptions;
use crate::endpoint::Endpoint;
use crate::health_check;
use crate::metadata::ServiceMetadata;
use k8s_openapi::api::core::v1::Endpoints;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Endpoints derived from one object, flat and grouped by service name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DerivedEndpoints {
    pub endpoints: Vec<Endpoint>,
    pub per_service: BTreeMap<String, Vec<Endpoint>>,
}

impl DerivedEndpoints {
    fn push(&mut self, endpoint: Endpoint) {
        self.per_service
            .entry(endpoint.name.clone())
            .or_default()
            .push(endpoint.clone());
        self.endpoints.push(endpoint);
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// EndpointAggregator walks subsets, ports and addresses of an Endpoints object
#[derive(Clone, Debug, Default)]
pub struct EndpointAggregator {
    options: SyncOptions,
}

impl EndpointAggregator {
    pub fn new(options: SyncOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Derive every endpoint of `object` that should be registered
    pub fn derive(&self, object: &Endpoints) -> DerivedEndpoints {
        let mut derived = DerivedEndpoints::default();
        let object_name = object.metadata.name.as_deref().unwrap_or_default();

        for subset in object.subsets.iter().flatten() {
            let addresses = subset.addresses.as_deref().unwrap_or_default();

            for port in subset.ports.iter().flatten() {
                let Some(port_number) = u16::try_from(port.port).ok().filter(|p| *p != 0) else {
                    warn!("Skipping invalid port {} on {}", port.port, object_name);
                    continue;
                };
                let service_port = port_number.to_string();
                let metadata = ServiceMetadata::resolve(object, &service_port);

                if metadata.get("ignore").is_some() {
                    debug!("Ignoring port {} of {}", service_port, object_name);
                    continue;
                }

                let service_name = match metadata.get("name") {
                    Some(name) => name,
                    None if self.options.explicit => continue,
                    None => object_name,
                };
                if service_name.is_empty() {
                    continue;
                }

                let tags = metadata.tags();
                for address in addresses {
                    let ref_name = address
                        .target_ref
                        .as_ref()
                        .and_then(|r| r.name.as_deref())
                        .unwrap_or_default();
                    let health_check =
                        health_check::synthesize(&metadata, &address.ip, &service_port);

                    derived.push(Endpoint::new(
                        service_name,
                        address.ip.as_str(),
                        port_number,
                        ref_name,
                        tags.clone(),
                        health_check,
                    ));
                }
            }
        }

        derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::HealthCheck;
    use k8s_openapi::api::core::v1::{EndpointAddress, EndpointPort, EndpointSubset, ObjectReference};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn address(ip: &str, target: Option<&str>) -> EndpointAddress {
        EndpointAddress {
            ip: ip.to_string(),
            target_ref: target.map(|name| ObjectReference {
                kind: Some("Pod".to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn port(number: i32) -> EndpointPort {
        EndpointPort {
            port: number,
            ..Default::default()
        }
    }

    fn object(
        name: &str,
        annotations: &[(&str, &str)],
        subsets: Vec<(Vec<EndpointAddress>, Vec<EndpointPort>)>,
    ) -> Endpoints {
        Endpoints {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                annotations: Some(
                    annotations.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                ),
                ..Default::default()
            },
            subsets: Some(
                subsets
                    .into_iter()
                    .map(|(addresses, ports)| EndpointSubset {
                        addresses: Some(addresses),
                        ports: Some(ports),
                        ..Default::default()
                    })
                    .collect(),
            ),
        }
    }

    #[test]
    fn test_no_subsets() {
        let ep = Endpoints {
            metadata: ObjectMeta {
                name: Some("svc-a".to_string()),
                ..Default::default()
            },
            subsets: None,
        };
        let derived = EndpointAggregator::default().derive(&ep);
        assert!(derived.is_empty());
        assert!(derived.per_service.is_empty());

        let derived = EndpointAggregator::default().derive(&object("svc-a", &[], vec![]));
        assert!(derived.is_empty());
        assert!(derived.per_service.is_empty());
    }

    #[test]
    fn test_named_service_with_http_check() {
        let ep = object(
            "svc-a",
            &[("SERVICE_CHECK_HTTP", "/health"), ("SERVICE_NAME", "web")],
            vec![(vec![address("10.0.0.1", None)], vec![port(80)])],
        );
        let derived = EndpointAggregator::default().derive(&ep);
        assert_eq!(
            derived.endpoints,
            vec![Endpoint::new(
                "web",
                "10.0.0.1",
                80,
                "",
                vec![],
                Some(HealthCheck {
                    url: "http://10.0.0.1:80/health".to_string(),
                    interval: "15s".to_string(),
                    timeout: "15s".to_string(),
                }),
            )]
        );
        assert_eq!(derived.per_service["web"], derived.endpoints);
    }

    #[test]
    fn test_falls_back_to_object_name() {
        let ep = object(
            "svc-a",
            &[],
            vec![(vec![address("10.0.0.1", Some("pod-1"))], vec![port(8080)])],
        );
        let derived = EndpointAggregator::default().derive(&ep);
        assert_eq!(derived.endpoints.len(), 1);
        assert_eq!(derived.endpoints[0].name, "svc-a");
        assert_eq!(derived.endpoints[0].ref_name, "pod-1");
        assert_eq!(derived.endpoints[0].health_check, None);
    }

    #[test]
    fn test_explicit_mode_drops_unnamed_ports() {
        let ep = object(
            "svc-a",
            &[("SERVICE_CHECK_HTTP", "/health")],
            vec![(vec![address("10.0.0.1", None)], vec![port(80)])],
        );
        let derived = EndpointAggregator::new(SyncOptions::explicit()).derive(&ep);
        assert!(derived.is_empty());
        assert!(derived.per_service.is_empty());
    }

    #[test]
    fn test_explicit_mode_keeps_named_ports() {
        let ep = object(
            "svc-a",
            &[("SERVICE_443_NAME", "web-tls")],
            vec![(vec![address("10.0.0.1", None)], vec![port(80), port(443)])],
        );
        let derived = EndpointAggregator::new(SyncOptions::explicit()).derive(&ep);
        assert_eq!(derived.endpoints.len(), 1);
        assert_eq!(derived.endpoints[0].name, "web-tls");
        assert_eq!(derived.endpoints[0].port, 443);
    }

    #[test]
    fn test_ignored_port_in_every_subset() {
        let ep = object(
            "svc-a",
            &[("SERVICE_9090_IGNORE", "true")],
            vec![
                (vec![address("10.0.0.1", None)], vec![port(80), port(9090)]),
                (vec![address("10.0.0.2", None)], vec![port(9090)]),
            ],
        );
        let derived = EndpointAggregator::default().derive(&ep);
        assert_eq!(derived.endpoints.len(), 1);
        assert!(derived.endpoints.iter().all(|e| e.port != 9090));
    }

    #[test]
    fn test_any_non_empty_ignore_value() {
        let ep = object(
            "svc-a",
            &[("SERVICE_IGNORE", "no")],
            vec![(vec![address("10.0.0.1", None)], vec![port(80)])],
        );
        assert!(EndpointAggregator::default().derive(&ep).is_empty());
    }

    #[test]
    fn test_grouping_is_exhaustive_and_exclusive() {
        let ep = object(
            "svc-a",
            &[("SERVICE_80_NAME", "web"), ("SERVICE_TAGS", "blue,v2")],
            vec![
                (
                    vec![address("10.0.0.1", Some("pod-1")), address("10.0.0.2", Some("pod-2"))],
                    vec![port(80), port(9000)],
                ),
                (vec![address("10.0.0.3", None)], vec![port(80)]),
            ],
        );
        let derived = EndpointAggregator::default().derive(&ep);
        assert_eq!(derived.endpoints.len(), 5);
        assert_eq!(derived.per_service.len(), 2);
        assert_eq!(derived.per_service["web"].len(), 3);
        assert_eq!(derived.per_service["svc-a"].len(), 2);

        let grouped: usize = derived.per_service.values().map(Vec::len).sum();
        assert_eq!(grouped, derived.endpoints.len());
        for endpoint in &derived.endpoints {
            assert_eq!(endpoint.tags, vec!["blue", "v2"]);
            let matches = derived
                .per_service
                .iter()
                .filter(|(_, group)| group.contains(endpoint))
                .collect::<Vec<_>>();
            assert_eq!(matches.len(), 1);
            assert_eq!(matches[0].0.as_str(), endpoint.name.as_str());
        }
    }

    #[test]
    fn test_ref_name_belongs_to_its_own_address() {
        let ep = object(
            "svc-a",
            &[],
            vec![(
                vec![address("10.0.0.1", Some("pod-1")), address("10.0.0.2", None)],
                vec![port(80)],
            )],
        );
        let derived = EndpointAggregator::default().derive(&ep);
        assert_eq!(derived.endpoints[0].ref_name, "pod-1");
        assert_eq!(derived.endpoints[1].ref_name, "");
    }

    #[test]
    fn test_invalid_port_is_skipped() {
        let ep = object(
            "svc-a",
            &[],
            vec![(vec![address("10.0.0.1", None)], vec![port(0), port(70000), port(80)])],
        );
        let derived = EndpointAggregator::default().derive(&ep);
        assert_eq!(derived.endpoints.len(), 1);
        assert_eq!(derived.endpoints[0].port, 80);
    }
}

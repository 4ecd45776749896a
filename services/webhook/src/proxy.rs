//! Desired state of a proxy service record
//!
//! One allocation request maps onto three hub objects: a `LoadBalancer`
//! Service that asks the allocator for an address, and the Endpoints and
//! EndpointSlice that route that address to the member cluster's node ports.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::api::discovery::v1::{
    Endpoint, EndpointPort as SlicePort, EndpointSlice,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use kube_lb_common::{endpoint_slice_name, AllocationRequest, MANAGED_BY_LABEL, ROLLOUT_LABEL};

const PORT_NAME: &str = "http";
const PROTOCOL: &str = "TCP";
const SERVICE_PORT: i32 = 80;

/// The three objects that make up one proxy, all in `namespace`.
#[derive(Debug, Clone)]
pub struct ProxyRecord {
    pub name: String,
    pub service: Service,
    pub endpoints: Endpoints,
    pub endpoint_slice: EndpointSlice,
}

impl ProxyRecord {
    pub fn from_request(req: &AllocationRequest, namespace: &str) -> Self {
        let name = req.proxy_name();
        Self {
            service: exposure_service(&name, namespace, req.node_port),
            endpoints: endpoints(&name, namespace, req.node_port, &req.node_ips),
            endpoint_slice: endpoint_slice(&name, namespace, req.node_port, &req.node_ips),
            name,
        }
    }
}

fn meta(name: &str, namespace: &str, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: (!labels.is_empty()).then_some(labels),
        ..Default::default()
    }
}

/// Selector-less `LoadBalancer` Service forwarding port 80 to `node_port`.
pub fn exposure_service(name: &str, namespace: &str, node_port: i32) -> Service {
    let labels = BTreeMap::from([(ROLLOUT_LABEL.0.to_string(), ROLLOUT_LABEL.1.to_string())]);

    Service {
        metadata: meta(name, namespace, labels),
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            ports: Some(vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                port: SERVICE_PORT,
                protocol: Some(PROTOCOL.to_string()),
                target_port: Some(IntOrString::Int(node_port)),
                ..Default::default()
            }]),
            selector: None,
            ..Default::default()
        }),
        status: None,
    }
}

/// Legacy address list: a single subset with every node IP.
pub fn endpoints(name: &str, namespace: &str, node_port: i32, node_ips: &[String]) -> Endpoints {
    Endpoints {
        metadata: meta(name, namespace, BTreeMap::new()),
        subsets: Some(vec![EndpointSubset {
            addresses: Some(
                node_ips
                    .iter()
                    .map(|ip| EndpointAddress {
                        ip: ip.clone(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ports: Some(vec![EndpointPort {
                name: Some(PORT_NAME.to_string()),
                port: node_port,
                protocol: Some(PROTOCOL.to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }]),
    }
}

/// Modern address list: one IPv4 endpoint per node IP.
pub fn endpoint_slice(
    name: &str,
    namespace: &str,
    node_port: i32,
    node_ips: &[String],
) -> EndpointSlice {
    // No `kubernetes.io/service-name`: the control plane already mirrors the
    // Endpoints into a slice for the exposure Service.
    let labels = BTreeMap::from([(MANAGED_BY_LABEL.0.to_string(), MANAGED_BY_LABEL.1.to_string())]);

    EndpointSlice {
        metadata: meta(&endpoint_slice_name(name), namespace, labels),
        address_type: "IPv4".to_string(),
        endpoints: node_ips
            .iter()
            .map(|ip| Endpoint {
                addresses: vec![ip.clone()],
                ..Default::default()
            })
            .collect(),
        ports: Some(vec![SlicePort {
            name: Some(PORT_NAME.to_string()),
            port: Some(node_port),
            protocol: Some(PROTOCOL.to_string()),
            ..Default::default()
        }]),
    }
}

/// First load-balancer ingress IP the allocator wrote, if any.
pub fn allocated_address(service: &Service) -> Option<String> {
    service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ing| ing.first())
        .and_then(|i| i.ip.clone())
        .filter(|ip| !ip.is_empty())
}

/// Target port of the exposure object's first port.
pub fn target_port(service: &Service) -> Option<i32> {
    match service
        .spec
        .as_ref()?
        .ports
        .as_ref()?
        .first()?
        .target_port
        .as_ref()?
    {
        IntOrString::Int(port) => Some(*port),
        IntOrString::String(_) => None,
    }
}

/// Node IPs listed by an Endpoints object, in order.
pub fn endpoints_addresses(endpoints: &Endpoints) -> Vec<String> {
    endpoints
        .subsets
        .iter()
        .flatten()
        .flat_map(|s| s.addresses.iter().flatten())
        .map(|a| a.ip.clone())
        .collect()
}

/// Node IPs listed by an EndpointSlice, in order.
pub fn slice_addresses(slice: &EndpointSlice) -> Vec<String> {
    slice
        .endpoints
        .iter()
        .flat_map(|e| e.addresses.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, ServiceStatus};

    fn request(ips: &[&str]) -> AllocationRequest {
        AllocationRequest {
            cluster_id: "c1".to_string(),
            service_name: "web".to_string(),
            namespace: "ns1".to_string(),
            node_port: 30080,
            node_ips: ips.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_record_names_and_namespace() {
        let record = ProxyRecord::from_request(&request(&["10.0.0.1"]), "kube-lb-services");

        assert_eq!(record.name, "c1-ns1-web");
        assert_eq!(record.service.metadata.name.as_deref(), Some("c1-ns1-web"));
        assert_eq!(record.endpoints.metadata.name.as_deref(), Some("c1-ns1-web"));
        assert_eq!(
            record.endpoint_slice.metadata.name.as_deref(),
            Some("c1-ns1-web-endpoint-slice")
        );
        for ns in [
            &record.service.metadata.namespace,
            &record.endpoints.metadata.namespace,
            &record.endpoint_slice.metadata.namespace,
        ] {
            assert_eq!(ns.as_deref(), Some("kube-lb-services"));
        }
    }

    #[test]
    fn test_exposure_service_shape() {
        let svc = exposure_service("c1-ns1-web", "kube-lb-services", 30080);
        let spec = svc.spec.as_ref().unwrap();

        assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
        assert!(spec.selector.is_none());
        assert_eq!(spec.ports.as_ref().unwrap()[0].port, 80);
        assert_eq!(target_port(&svc), Some(30080));
        assert_eq!(
            svc.metadata.labels.as_ref().unwrap().get("color").map(String::as_str),
            Some("blue")
        );
    }

    #[test]
    fn test_address_lists_match_request() {
        let ips = ["10.0.0.1", "10.0.0.2"];
        let record = ProxyRecord::from_request(&request(&ips), "kube-lb-services");

        assert_eq!(endpoints_addresses(&record.endpoints), ips);
        assert_eq!(slice_addresses(&record.endpoint_slice), ips);
        assert_eq!(record.endpoint_slice.address_type, "IPv4");
        assert_eq!(
            record.endpoint_slice.ports.as_ref().unwrap()[0].port,
            Some(30080)
        );
        let labels = record.endpoint_slice.metadata.labels.as_ref().unwrap();
        assert_eq!(
            labels.get("endpointslice.kubernetes.io/managed-by").map(String::as_str),
            Some("kube-lb")
        );
        assert!(!labels.contains_key("kubernetes.io/service-name"));
    }

    #[test]
    fn test_allocated_address() {
        let mut svc = exposure_service("x", "y", 30000);
        assert_eq!(allocated_address(&svc), None);

        svc.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    ip: Some(String::new()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        });
        assert_eq!(allocated_address(&svc), None);

        svc.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    ip: Some("192.0.2.5".to_string()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        });
        assert_eq!(allocated_address(&svc), Some("192.0.2.5".to_string()));
    }
}

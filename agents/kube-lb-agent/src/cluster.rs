//! Member cluster access
//!
//! Everything the agent reads from or writes to its own cluster goes through
//! [`MemberCluster`], so the watcher and bootstrapper can be exercised
//! against an in-memory cluster.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Service};
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;

use kube_lb_common::WORKER_NODE_LABEL;

#[async_trait]
pub trait MemberCluster: Send + Sync {
    /// List nodes, optionally filtered by a label selector.
    async fn list_nodes(&self, label_selector: Option<&str>) -> Result<Vec<Node>, kube::Error>;

    /// Add `key` with an empty value to the node's labels.
    async fn label_node(&self, name: &str, key: &str) -> Result<(), kube::Error>;

    /// All Services in every namespace.
    async fn list_services(&self) -> Result<Vec<Service>, kube::Error>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, kube::Error>;

    /// Write `svc` back over the live object.
    async fn replace_service(&self, svc: &Service) -> Result<(), kube::Error>;
}

/// [`MemberCluster`] backed by the API server.
#[derive(Clone)]
pub struct KubeMemberCluster {
    client: Client,
}

impl KubeMemberCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MemberCluster for KubeMemberCluster {
    async fn list_nodes(&self, label_selector: Option<&str>) -> Result<Vec<Node>, kube::Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        Ok(api.list(&params).await?.items)
    }

    async fn label_node(&self, name: &str, key: &str) -> Result<(), kube::Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        let patch = json!({ "metadata": { "labels": { key: "" } } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn list_services(&self) -> Result<Vec<Service>, kube::Error> {
        let api: Api<Service> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, kube::Error> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await
    }

    async fn replace_service(&self, svc: &Service) -> Result<(), kube::Error> {
        let namespace = svc.namespace().unwrap_or_default();
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&svc.name_any(), &PostParams::default(), svc)
            .await?;
        Ok(())
    }
}

/// InternalIP of every node carrying the worker label, queried fresh.
pub async fn worker_node_ips(cluster: &dyn MemberCluster) -> Result<Vec<String>, kube::Error> {
    let nodes = cluster.list_nodes(Some(WORKER_NODE_LABEL)).await?;
    Ok(internal_ips(&nodes))
}

pub fn internal_ips(nodes: &[Node]) -> Vec<String> {
    nodes
        .iter()
        .filter_map(|n| n.status.as_ref())
        .flat_map(|s| s.addresses.iter().flatten())
        .filter(|a| a.type_ == "InternalIP")
        .map(|a| a.address.clone())
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory member cluster.

    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use k8s_openapi::api::core::v1::{
        NodeAddress, NodeStatus, ServicePort, ServiceSpec,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::core::ErrorResponse;

    #[derive(Default)]
    pub struct MemoryCluster {
        pub nodes: Mutex<Vec<Node>>,
        pub services: Mutex<BTreeMap<(String, String), Service>>,
        pub fail_label: bool,
        pub label_calls: AtomicUsize,
        pub replace_calls: AtomicUsize,
    }

    pub fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("simulated {}", reason),
            reason: reason.to_string(),
            code,
        })
    }

    impl MemoryCluster {
        pub fn with_nodes(nodes: Vec<Node>) -> Self {
            Self {
                nodes: Mutex::new(nodes),
                ..Default::default()
            }
        }

        pub fn add_service(&self, svc: Service) {
            let key = (svc.namespace().unwrap_or_default(), svc.name_any());
            self.services.lock().unwrap().insert(key, svc);
        }

        pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
            self.services
                .lock()
                .unwrap()
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
        }

        pub fn node(&self, name: &str) -> Option<Node> {
            self.nodes
                .lock()
                .unwrap()
                .iter()
                .find(|n| n.name_any() == name)
                .cloned()
        }
    }

    #[async_trait]
    impl MemberCluster for MemoryCluster {
        async fn list_nodes(&self, label_selector: Option<&str>) -> Result<Vec<Node>, kube::Error> {
            let nodes = self.nodes.lock().unwrap();
            Ok(nodes
                .iter()
                .filter(|n| label_selector.map_or(true, |key| n.labels().contains_key(key)))
                .cloned()
                .collect())
        }

        async fn label_node(&self, name: &str, key: &str) -> Result<(), kube::Error> {
            self.label_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_label {
                return Err(api_error(500, "InternalError"));
            }
            let mut nodes = self.nodes.lock().unwrap();
            let node = nodes
                .iter_mut()
                .find(|n| n.name_any() == name)
                .ok_or_else(|| api_error(404, "NotFound"))?;
            node.labels_mut().insert(key.to_string(), String::new());
            Ok(())
        }

        async fn list_services(&self) -> Result<Vec<Service>, kube::Error> {
            Ok(self.services.lock().unwrap().values().cloned().collect())
        }

        async fn get_service(
            &self,
            namespace: &str,
            name: &str,
        ) -> Result<Option<Service>, kube::Error> {
            Ok(self.service(namespace, name))
        }

        async fn replace_service(&self, svc: &Service) -> Result<(), kube::Error> {
            self.replace_calls.fetch_add(1, Ordering::SeqCst);
            let key = (svc.namespace().unwrap_or_default(), svc.name_any());
            let mut services = self.services.lock().unwrap();
            if !services.contains_key(&key) {
                return Err(api_error(404, "NotFound"));
            }
            services.insert(key, svc.clone());
            Ok(())
        }
    }

    pub fn node(name: &str, labels: &[&str], internal_ip: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|l| (l.to_string(), String::new()))
                        .collect(),
                ),
                ..Default::default()
            },
            status: Some(NodeStatus {
                addresses: Some(vec![
                    NodeAddress {
                        type_: "Hostname".to_string(),
                        address: name.to_string(),
                    },
                    NodeAddress {
                        type_: "InternalIP".to_string(),
                        address: internal_ip.to_string(),
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn service(namespace: &str, name: &str, type_: Option<&str>, node_port: Option<i32>) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: type_.map(str::to_string),
                ports: Some(vec![ServicePort {
                    port: 80,
                    node_port,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }
}

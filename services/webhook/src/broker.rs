//! Allocation Broker
//!
//! Drives one request through the proxy lifecycle:
//!
//! 1. validate and derive the proxy name
//! 2. create or update the exposure Service
//! 3. poll until the external allocator assigns an address
//! 4. create or update the Endpoints and EndpointSlice
//!
//! The address lists are only written once an address exists. Everything
//! for one proxy name runs under a per-name lock.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::{Api, Client};
use tracing::{error, info};

use kube_lb_common::{AllocationRequest, AllocationResponse, KeyedLocks};

use crate::error::BrokerError;
use crate::poller::{wait_for_address, PollOutcome, RetryPolicy};
use crate::proxy::ProxyRecord;
use crate::store::ObjectStore;
use crate::sync::ensure;

/// Hub-side state shared by every `/vip` request.
pub struct Broker {
    namespace: String,
    services: Arc<dyn ObjectStore<Service>>,
    endpoints: Arc<dyn ObjectStore<Endpoints>>,
    endpoint_slices: Arc<dyn ObjectStore<EndpointSlice>>,
    policy: RetryPolicy,
    locks: KeyedLocks,
}

impl Broker {
    pub fn new(
        namespace: impl Into<String>,
        services: Arc<dyn ObjectStore<Service>>,
        endpoints: Arc<dyn ObjectStore<Endpoints>>,
        endpoint_slices: Arc<dyn ObjectStore<EndpointSlice>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            services,
            endpoints,
            endpoint_slices,
            policy,
            locks: KeyedLocks::new(),
        }
    }

    /// Broker backed by the hub cluster's API server.
    pub fn from_client(client: Client, namespace: &str, policy: RetryPolicy) -> Self {
        Self::new(
            namespace,
            Arc::new(Api::<Service>::namespaced(client.clone(), namespace)),
            Arc::new(Api::<Endpoints>::namespaced(client.clone(), namespace)),
            Arc::new(Api::<EndpointSlice>::namespaced(client, namespace)),
            policy,
        )
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Handle one allocation request end to end.
    pub async fn allocate(&self, req: &AllocationRequest) -> Result<AllocationResponse, BrokerError> {
        req.validate()?;

        info!(
            cluster_id = %req.cluster_id,
            namespace = %req.namespace,
            service = %req.service_name,
            node_port = req.node_port,
            node_ips = ?req.node_ips,
            "Received allocation request"
        );

        let record = ProxyRecord::from_request(req, &self.namespace);
        let _guard = self.locks.lock(&record.name).await;

        ensure(self.services.as_ref(), record.service.clone())
            .await
            .map_err(|source| BrokerError::Sync {
                kind: "Service",
                name: record.name.clone(),
                source,
            })?;

        let vip = match wait_for_address(self.services.as_ref(), &record.name, self.policy).await {
            PollOutcome::Bound { value, attempt } => {
                info!(name = %record.name, vip = %value, attempt, "Allocated VIP");
                value
            }
            PollOutcome::TimedOut { attempts } => {
                error!(name = %record.name, attempts, "Failed to get VIP from allocator");
                return Err(BrokerError::AllocationTimeout {
                    name: record.name,
                    attempts,
                });
            }
        };

        ensure(self.endpoints.as_ref(), record.endpoints.clone())
            .await
            .map_err(|source| BrokerError::Sync {
                kind: "Endpoints",
                name: record.name.clone(),
                source,
            })?;

        let slice_name = record.endpoint_slice.metadata.name.clone().unwrap_or_default();
        ensure(self.endpoint_slices.as_ref(), record.endpoint_slice)
            .await
            .map_err(|source| BrokerError::Sync {
                kind: "EndpointSlice",
                name: slice_name,
                source,
            })?;

        info!(name = %record.name, vip = %vip, "Successfully allocated VIP");
        Ok(AllocationResponse { vip })
    }
}

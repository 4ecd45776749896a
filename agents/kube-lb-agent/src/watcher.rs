//! Service Watcher
//!
//! Watches Services in every namespace. Each create or update of a
//! `LoadBalancer` Service re-issues an allocation request with the current
//! worker node IPs and writes the returned VIP into `spec.externalIPs`.
//!
//! Failures are logged and the event is dropped; the next update or the
//! periodic resync retries it. Deleting a Service does not retract its hub
//! proxy record.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, ResourceExt};
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use kube_lb_common::{AllocationRequest, KeyedLocks};

use crate::client::{ClientError, VipAllocator};
use crate::cluster::{worker_node_ips, MemberCluster};
use crate::exposure::ExposureClass;

/// What happened to a Service, as seen by this agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("service {key} has unknown type {class:?}")]
    UnknownExposureClass { key: String, class: String },

    #[error("service {key} has no ports")]
    NoPorts { key: String },

    #[error("service {key} has no node port allocated")]
    NoNodePort { key: String },

    #[error("no worker nodes with an InternalIP")]
    NoWorkerNodes,

    #[error("service {key} no longer exists")]
    ServiceGone { key: String },

    #[error(transparent)]
    Allocation(#[from] ClientError),

    #[error("cluster request failed: {0}")]
    Cluster(#[from] kube::Error),
}

/// Result of handling one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Not a `LoadBalancer` Service, or a deletion.
    Ignored,
    /// VIP already present on the Service.
    Unchanged(String),
    /// VIP written into `spec.externalIPs`.
    Assigned(String),
}

fn key_of(svc: &Service) -> String {
    format!("{}/{}", svc.namespace().unwrap_or_default(), svc.name_any())
}

#[derive(Clone)]
pub struct ServiceWatcher {
    cluster_id: String,
    cluster: Arc<dyn MemberCluster>,
    allocator: Arc<dyn VipAllocator>,
    locks: KeyedLocks,
    seen: Arc<Mutex<HashSet<String>>>,
}

impl ServiceWatcher {
    pub fn new(
        cluster_id: impl Into<String>,
        cluster: Arc<dyn MemberCluster>,
        allocator: Arc<dyn VipAllocator>,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            cluster,
            allocator,
            locks: KeyedLocks::new(),
            seen: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Name an applied or deleted Service's transition, remembering which
    /// keys have been seen so re-applies count as updates.
    pub fn classify(&self, svc: &Service, deleted: bool) -> Transition {
        let key = key_of(svc);
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if deleted {
            seen.remove(&key);
            Transition::Deleted
        } else if seen.insert(key) {
            Transition::Created
        } else {
            Transition::Updated
        }
    }

    /// Forget every key not in a freshly listed set.
    pub fn restart(&self, services: &[Service]) {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        *seen = services.iter().map(key_of).collect();
    }

    /// Handle one transition to completion.
    pub async fn on_transition(&self, transition: Transition, svc: &Service) -> Result<Handled, WatchError> {
        let key = key_of(svc);

        if transition == Transition::Deleted {
            info!(service = %key, "Service deleted; hub proxy record is left in place");
            return Ok(Handled::Ignored);
        }

        let class = ExposureClass::of(svc).map_err(|e| WatchError::UnknownExposureClass {
            key: key.clone(),
            class: e.0,
        })?;
        if !class.needs_external_address() {
            debug!(service = %key, class = %class, "Ignoring service");
            return Ok(Handled::Ignored);
        }

        debug!(service = %key, transition = ?transition, "Processing LoadBalancer service");
        self.process_service(svc).await
    }

    /// Request a VIP for the Service `svc` names and write it onto the live
    /// object. Only the event's identity is used: the request is built from
    /// the Service as read under the per-key lock.
    pub async fn process_service(&self, svc: &Service) -> Result<Handled, WatchError> {
        let namespace = svc.namespace().unwrap_or_default();
        let name = svc.name_any();
        let key = format!("{}/{}", namespace, name);
        let _guard = self.locks.lock(&key).await;

        let live = self
            .cluster
            .get_service(&namespace, &name)
            .await?
            .ok_or_else(|| WatchError::ServiceGone { key: key.clone() })?;
        if !matches!(ExposureClass::of(&live), Ok(ExposureClass::LoadBalancer)) {
            debug!(service = %key, "Service is no longer a LoadBalancer");
            return Ok(Handled::Ignored);
        }

        let node_ips = worker_node_ips(self.cluster.as_ref()).await?;
        let req = self.build_request(&live, node_ips)?;

        let resp = self.allocator.allocate(&req).await?;
        self.write_external_ip(&req.namespace, &req.service_name, &resp.vip)
            .await
    }

    pub fn build_request(&self, svc: &Service, node_ips: Vec<String>) -> Result<AllocationRequest, WatchError> {
        let key = key_of(svc);
        let port = svc
            .spec
            .as_ref()
            .and_then(|s| s.ports.as_ref())
            .and_then(|p| p.first())
            .ok_or_else(|| WatchError::NoPorts { key: key.clone() })?;
        let node_port = port
            .node_port
            .filter(|p| *p != 0)
            .ok_or_else(|| WatchError::NoNodePort { key: key.clone() })?;
        if node_ips.is_empty() {
            return Err(WatchError::NoWorkerNodes);
        }

        Ok(AllocationRequest {
            cluster_id: self.cluster_id.clone(),
            service_name: svc.name_any(),
            namespace: svc.namespace().unwrap_or_default(),
            node_port,
            node_ips,
        })
    }

    /// Read-modify-write of `spec.externalIPs` on the freshly fetched Service.
    async fn write_external_ip(&self, namespace: &str, name: &str, vip: &str) -> Result<Handled, WatchError> {
        let key = format!("{}/{}", namespace, name);
        let mut live = self
            .cluster
            .get_service(namespace, name)
            .await?
            .ok_or_else(|| WatchError::ServiceGone { key: key.clone() })?;

        let spec = live.spec.get_or_insert_with(Default::default);
        let desired = vec![vip.to_string()];
        if spec.external_ips.as_ref() == Some(&desired) {
            debug!(service = %key, vip = %vip, "External IP already set");
            return Ok(Handled::Unchanged(vip.to_string()));
        }
        spec.external_ips = Some(desired);

        self.cluster.replace_service(&live).await?;
        info!(service = %key, vip = %vip, "Updated service with VIP");
        Ok(Handled::Assigned(vip.to_string()))
    }

    /// Handle a transition on its own task, logging the outcome.
    pub fn dispatch(&self, transition: Transition, svc: Service) {
        let this = self.clone();
        tokio::spawn(async move {
            match this.on_transition(transition, &svc).await {
                Ok(_) => {}
                Err(e @ WatchError::UnknownExposureClass { .. }) => {
                    warn!(error = %e, "Unexpected service payload");
                }
                Err(e) => {
                    error!(service = %key_of(&svc), error = %e, "Failed to process service");
                }
            }
        });
    }

    /// Re-process every `LoadBalancer` Service in the cluster.
    pub async fn resync(&self) -> Result<usize, WatchError> {
        let services = self.cluster.list_services().await?;
        let mut count = 0;
        for svc in services {
            if matches!(ExposureClass::of(&svc), Ok(ExposureClass::LoadBalancer)) {
                self.dispatch(Transition::Updated, svc);
                count += 1;
            }
        }
        Ok(count)
    }

    /// Watch Services until `shutdown` resolves.
    pub async fn run<S>(self, api: Api<Service>, resync_every: Duration, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
        tokio::pin!(stream);
        tokio::pin!(shutdown);

        let mut ticker = interval(resync_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the initial list covers it.
        ticker.tick().await;

        info!(resync_secs = resync_every.as_secs(), "Watching services");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Service watcher stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match self.resync().await {
                        Ok(count) => debug!(count, "Resynced LoadBalancer services"),
                        Err(e) => warn!(error = %e, "Resync failed"),
                    }
                }
                event = stream.next() => match event {
                    Some(Ok(Event::Applied(svc))) => {
                        let transition = self.classify(&svc, false);
                        self.dispatch(transition, svc);
                    }
                    Some(Ok(Event::Deleted(svc))) => {
                        let transition = self.classify(&svc, true);
                        self.dispatch(transition, svc);
                    }
                    Some(Ok(Event::Restarted(services))) => {
                        info!(count = services.len(), "Service watch (re)started");
                        self.restart(&services);
                        for svc in services {
                            self.dispatch(Transition::Created, svc);
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "Service watch error"),
                    None => {
                        error!("Service watch stream ended");
                        return;
                    }
                },
            }
        }
    }
}

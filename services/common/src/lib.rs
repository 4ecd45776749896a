//! kube-lb shared library
//!
//! Types and conventions shared by the member-side agent and the hub-side
//! webhook: the `/vip` wire protocol, request validation, deterministic proxy
//! naming, and the per-key lock both sides use to serialize work.

pub mod api;
pub mod keyed_lock;
pub mod naming;

pub use api::{AllocationRequest, AllocationResponse, ErrorBody, ValidationError};
pub use keyed_lock::{KeyGuard, KeyedLocks};
pub use naming::{endpoint_slice_name, proxy_name};

use std::time::Duration;

/// HTTP route served by the webhook.
pub const VIP_ROUTE: &str = "/vip";

/// Namespace on the hub cluster that holds every proxy object.
pub const PROXY_NAMESPACE: &str = "kube-lb-services";

/// Presence-only label marking worker nodes on the member cluster.
pub const WORKER_NODE_LABEL: &str = "kube-lb.io/worker-node";

/// Labels identifying control-plane nodes.
pub const CONTROL_PLANE_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// Rollout label stamped on every exposure object (blue/green scheme).
pub const ROLLOUT_LABEL: (&str, &str) = ("color", "blue");

/// Manager label stamped on endpoint slices written by the webhook.
pub const MANAGED_BY_LABEL: (&str, &str) = ("endpointslice.kubernetes.io/managed-by", "kube-lb");

/// Number of times the webhook re-reads the exposure object for an address.
pub const ALLOCATION_POLL_ATTEMPTS: u32 = 10;

/// Fixed wait before each poll attempt.
pub const ALLOCATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longest time the webhook can spend waiting for the external allocator.
pub const MAX_ALLOCATION_WAIT: Duration =
    Duration::from_secs(ALLOCATION_POLL_ATTEMPTS as u64 * ALLOCATION_POLL_INTERVAL.as_secs());

/// Slack the agent adds on top of [`MAX_ALLOCATION_WAIT`] for object sync and transport.
pub const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Default agent request timeout; always strictly longer than the webhook's poll.
pub const DEFAULT_CLIENT_TIMEOUT: Duration =
    Duration::from_secs(MAX_ALLOCATION_WAIT.as_secs() + CLIENT_TIMEOUT_MARGIN.as_secs());

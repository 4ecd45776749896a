//! kube-lb agent
//!
//! Member-side half of kube-lb. Labels worker nodes once at startup, then
//! watches Services and asks the hub webhook for a VIP whenever a
//! `LoadBalancer` Service is created or updated.

pub mod bootstrap;
pub mod client;
pub mod cluster;
pub mod config;
pub mod exposure;
pub mod watcher;

pub use bootstrap::label_worker_nodes;
pub use client::{VipAllocator, WebhookClient};
pub use cluster::{KubeMemberCluster, MemberCluster};
pub use watcher::ServiceWatcher;

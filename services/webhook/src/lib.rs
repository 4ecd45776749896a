//! kube-lb webhook
//!
//! Hub-side half of kube-lb. Member clusters post allocation requests; the
//! webhook mirrors each request as a selector-less `LoadBalancer` Service
//! plus hand-written Endpoints/EndpointSlice in its own namespace, waits for
//! the hub's allocator to assign an address, and returns it.

pub mod broker;
pub mod config;
pub mod error;
pub mod poller;
pub mod proxy;
pub mod server;
pub mod store;
pub mod sync;

pub use broker::Broker;
pub use error::BrokerError;
pub use poller::RetryPolicy;
pub use server::{router, AppState};

//! Webhook command line

use std::net::SocketAddr;
use std::time::Duration;

use clap::builder::NonEmptyStringValueParser;
use clap::Parser;

use kube_lb_common::{ALLOCATION_POLL_ATTEMPTS, PROXY_NAMESPACE};

use crate::poller::RetryPolicy;

/// kube-lb webhook - hands out hub-cluster VIPs to member clusters
#[derive(Parser, Debug, Clone)]
#[command(name = "webhook", version, about)]
pub struct Args {
    /// Address to serve `/vip` on
    #[arg(long, default_value = "0.0.0.0:8080", env = "LISTEN_ADDR")]
    pub listen: SocketAddr,

    /// Namespace holding proxy Services, Endpoints and EndpointSlices
    #[arg(
        long,
        default_value = PROXY_NAMESPACE,
        env = "PROXY_NAMESPACE",
        value_parser = NonEmptyStringValueParser::new()
    )]
    pub namespace: String,

    /// Times to re-read the proxy Service waiting for an address
    #[arg(long, default_value_t = ALLOCATION_POLL_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..))]
    pub poll_attempts: u32,

    /// Wait before each read, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,
}

impl Args {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.poll_attempts, Duration::from_millis(self.poll_interval_ms))
    }
}

//! Agent command line

use std::time::Duration;

use clap::builder::NonEmptyStringValueParser;
use clap::Parser;

use kube_lb_common::DEFAULT_CLIENT_TIMEOUT;

/// kube-lb agent - requests hub VIPs for this cluster's LoadBalancer Services
#[derive(Parser, Debug, Clone)]
#[command(name = "agent", version, about)]
pub struct Args {
    /// Identifier of this member cluster, first segment of every proxy name
    #[arg(long, env = "CLUSTER_ID", value_parser = NonEmptyStringValueParser::new())]
    pub cluster_id: String,

    /// Base URL of the hub webhook (`/vip` is appended unless present)
    #[arg(long, env = "WEBHOOK_URL", value_parser = NonEmptyStringValueParser::new())]
    pub webhook_url: String,

    /// Allocation request timeout in seconds
    #[arg(
        long,
        env = "REQUEST_TIMEOUT_SECS",
        default_value_t = DEFAULT_CLIENT_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub request_timeout_secs: u64,

    /// Interval between full re-lists of LoadBalancer Services, in seconds
    #[arg(
        long,
        env = "RESYNC_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub resync_secs: u64,

    /// Do not label worker nodes at startup
    #[arg(long)]
    pub skip_node_labeling: bool,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from([
            "agent",
            "--cluster-id",
            "c1",
            "--webhook-url",
            "http://hub:8080",
        ])
        .unwrap();

        assert_eq!(args.cluster_id, "c1");
        assert_eq!(args.request_timeout(), DEFAULT_CLIENT_TIMEOUT);
        assert_eq!(args.resync_interval(), Duration::from_secs(30));
        assert!(!args.skip_node_labeling);
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "agent",
            "--cluster-id",
            "c2",
            "--webhook-url",
            "http://hub/vip",
            "--request-timeout-secs",
            "20",
            "--resync-secs",
            "5",
            "--skip-node-labeling",
        ])
        .unwrap();

        assert_eq!(args.request_timeout(), Duration::from_secs(20));
        assert_eq!(args.resync_interval(), Duration::from_secs(5));
        assert!(args.skip_node_labeling);
    }

    #[test]
    fn test_rejects_empty_identity() {
        assert!(Args::try_parse_from(["agent", "--cluster-id", "", "--webhook-url", "http://hub"]).is_err());
        assert!(Args::try_parse_from([
            "agent",
            "--cluster-id",
            "c1",
            "--webhook-url",
            "http://hub",
            "--request-timeout-secs",
            "0",
        ])
        .is_err());
    }
}

//! kube-lb agent

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use kube_lb_agent::config::Args;
use kube_lb_agent::{label_worker_nodes, KubeMemberCluster, ServiceWatcher, WebhookClient};
use kube_lb_common::MAX_ALLOCATION_WAIT;

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .json()
        .init();

    let args = Args::parse();

    if args.request_timeout() <= MAX_ALLOCATION_WAIT {
        warn!(
            timeout_secs = args.request_timeout_secs,
            "Request timeout does not cover the webhook's allocation wait; slow allocations will be dropped"
        );
    }

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let cluster = Arc::new(KubeMemberCluster::new(client.clone()));

    if args.skip_node_labeling {
        info!("Skipping worker node labeling");
    } else {
        let summary = label_worker_nodes(cluster.as_ref())
            .await
            .context("Failed to label worker nodes")?;
        info!(
            labeled = summary.labeled,
            already_labeled = summary.already_labeled,
            control_plane = summary.control_plane,
            "Worker nodes labeled"
        );
    }

    let webhook = WebhookClient::new(&args.webhook_url, args.request_timeout())
        .context("Failed to build webhook client")?;
    info!(
        cluster_id = %args.cluster_id,
        endpoint = %webhook.endpoint(),
        "Starting kube-lb agent"
    );

    let watcher = ServiceWatcher::new(args.cluster_id.clone(), cluster, Arc::new(webhook));
    watcher
        .run(Api::<Service>::all(client), args.resync_interval(), shutdown_signal())
        .await;

    info!("Agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

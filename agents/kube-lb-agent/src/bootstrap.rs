//! Node Registry Bootstrapper
//!
//! Runs once at startup: every node that is not control-plane gets the
//! presence-only worker label that later filters the node IPs sent with each
//! allocation request. Any failure aborts startup.

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, info};

use kube_lb_common::{CONTROL_PLANE_LABELS, WORKER_NODE_LABEL};

use crate::cluster::MemberCluster;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

pub fn node_role(node: &Node) -> NodeRole {
    let labels = node.labels();
    if CONTROL_PLANE_LABELS.iter().any(|l| labels.contains_key(*l)) {
        NodeRole::ControlPlane
    } else {
        NodeRole::Worker
    }
}

/// Counts from one labeling pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LabelSummary {
    pub labeled: usize,
    pub already_labeled: usize,
    pub control_plane: usize,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to list nodes: {0}")]
    List(#[source] kube::Error),

    #[error("failed to label node {node}: {source}")]
    Label {
        node: String,
        #[source]
        source: kube::Error,
    },
}

/// Label every unlabeled worker node. Safe to re-run.
pub async fn label_worker_nodes(cluster: &dyn MemberCluster) -> Result<LabelSummary, BootstrapError> {
    let nodes = cluster.list_nodes(None).await.map_err(BootstrapError::List)?;
    let mut summary = LabelSummary::default();

    for node in &nodes {
        let name = node.name_any();

        if node_role(node) == NodeRole::ControlPlane {
            debug!(node = %name, "Skipping control-plane node");
            summary.control_plane += 1;
            continue;
        }
        if node.labels().contains_key(WORKER_NODE_LABEL) {
            summary.already_labeled += 1;
            continue;
        }

        cluster
            .label_node(&name, WORKER_NODE_LABEL)
            .await
            .map_err(|source| BootstrapError::Label {
                node: name.clone(),
                source,
            })?;
        info!(node = %name, "Labeled node as worker node");
        summary.labeled += 1;
    }

    Ok(summary)
}

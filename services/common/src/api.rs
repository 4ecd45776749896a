//! `/vip` wire protocol
//!
//! The agent posts an [`AllocationRequest`] describing one `LoadBalancer`
//! Service; the webhook answers with an [`AllocationResponse`] carrying the
//! address the hub's allocator assigned.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming::{proxy_name, MAX_PROXY_NAME_LEN};

/// One exposure intent sent by a member cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub cluster_id: String,
    pub service_name: String,
    pub namespace: String,
    pub node_port: i32,
    pub node_ips: Vec<String>,
}

/// Address assigned to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResponse {
    pub vip: String,
}

/// JSON body returned by the webhook on any non-200 status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Reasons an [`AllocationRequest`] is rejected before any object is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("node_port {0} is outside 1-65535")]
    InvalidNodePort(i32),

    #[error("proxy name {name} exceeds {max} characters")]
    NameTooLong { name: String, max: usize },
}

impl AllocationRequest {
    /// Check every field the webhook relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cluster_id.is_empty() {
            return Err(ValidationError::MissingField("cluster_id"));
        }
        if self.namespace.is_empty() {
            return Err(ValidationError::MissingField("namespace"));
        }
        if self.service_name.is_empty() {
            return Err(ValidationError::MissingField("service_name"));
        }
        if self.node_port == 0 {
            return Err(ValidationError::MissingField("node_port"));
        }
        if !(1..=65535).contains(&self.node_port) {
            return Err(ValidationError::InvalidNodePort(self.node_port));
        }
        if self.node_ips.is_empty() || self.node_ips.iter().any(|ip| ip.is_empty()) {
            return Err(ValidationError::MissingField("node_ips"));
        }

        let name = self.proxy_name();
        if name.len() > MAX_PROXY_NAME_LEN {
            return Err(ValidationError::NameTooLong {
                name,
                max: MAX_PROXY_NAME_LEN,
            });
        }

        Ok(())
    }

    /// Deterministic name of the hub-side proxy objects for this request.
    pub fn proxy_name(&self) -> String {
        proxy_name(&self.cluster_id, &self.namespace, &self.service_name)
    }
}

//! Webhook error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use kube_lb_common::{ErrorBody, ValidationError};

/// Errors surfaced by the `/vip` endpoint.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Kubernetes client not ready yet
    #[error("VIP pool not initialized")]
    NotReady,

    /// Body was not a valid allocation request
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Body decoded but a field failed validation
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// Reading or writing a proxy object failed
    #[error("failed to sync {kind} {name}: {source}")]
    Sync {
        kind: &'static str,
        name: String,
        #[source]
        source: kube::Error,
    },

    /// The allocator never assigned an address
    #[error("no VIP assigned to {name} after {attempts} attempts")]
    AllocationTimeout { name: String, attempts: u32 },
}

impl BrokerError {
    pub fn status(&self) -> StatusCode {
        match self {
            BrokerError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            BrokerError::InvalidBody(_) | BrokerError::Invalid(_) => StatusCode::BAD_REQUEST,
            BrokerError::Sync { .. } | BrokerError::AllocationTimeout { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(BrokerError::NotReady.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            BrokerError::InvalidBody("eof".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BrokerError::from(ValidationError::MissingField("node_ips")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BrokerError::AllocationTimeout {
                name: "c1-ns1-web".into(),
                attempts: 10
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_message_passes_through() {
        let err = BrokerError::from(ValidationError::MissingField("cluster_id"));
        assert_eq!(err.to_string(), "missing required field: cluster_id");
    }
}

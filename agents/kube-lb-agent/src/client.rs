//! Allocation Client
//!
//! One bounded-timeout `POST /vip` per request. The caller treats every
//! failure the same way (log and drop), but the variants keep transport,
//! status, and decode failures apart in the logs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use kube_lb_common::{AllocationRequest, AllocationResponse, VIP_ROUTE};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to call webhook: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("webhook returned non-OK status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode webhook response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Something that can turn an allocation request into a VIP.
#[async_trait]
pub trait VipAllocator: Send + Sync {
    async fn allocate(&self, req: &AllocationRequest) -> Result<AllocationResponse, ClientError>;
}

/// [`VipAllocator`] that calls the hub webhook over HTTP.
pub struct WebhookClient {
    http_client: Client,
    endpoint: String,
}

impl WebhookClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kube-lb-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Transport)?;

        Ok(Self {
            http_client,
            endpoint: vip_endpoint(base_url),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// `{base}/vip`, unless `base` already points at the route.
pub fn vip_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with(VIP_ROUTE) {
        base.to_string()
    } else {
        format!("{}{}", base, VIP_ROUTE)
    }
}

#[async_trait]
impl VipAllocator for WebhookClient {
    async fn allocate(&self, req: &AllocationRequest) -> Result<AllocationResponse, ClientError> {
        debug!(endpoint = %self.endpoint, service = %req.service_name, "Calling webhook");

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(req)
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(ClientError::Transport)?;
        serde_json::from_slice(&bytes).map_err(ClientError::Decode)
    }
}

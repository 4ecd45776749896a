//! Allocation Poller
//!
//! The external allocator assigns addresses on its own schedule, so the
//! broker waits for it with a fixed-interval, fixed-count retry loop. Time
//! comes from the tokio clock, which tests pause and advance.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::Service;
use tokio::time::sleep;
use tracing::{debug, warn};

use kube_lb_common::{ALLOCATION_POLL_ATTEMPTS, ALLOCATION_POLL_INTERVAL};

use crate::proxy::allocated_address;
use crate::store::ObjectStore;

/// How many times to try and how long to wait before each try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: ALLOCATION_POLL_ATTEMPTS,
            interval: ALLOCATION_POLL_INTERVAL,
        }
    }
}

/// Terminal state of a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Bound { value: T, attempt: u32 },
    TimedOut { attempts: u32 },
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Worst-case time spent in [`RetryPolicy::poll`], saturating at `Duration::MAX`.
    pub fn max_wait(&self) -> Duration {
        self.interval
            .checked_mul(self.attempts)
            .unwrap_or(Duration::MAX)
    }

    /// Wait one interval, run `probe`, and repeat until it yields a value
    /// or the attempts are spent.
    pub async fn poll<T, F, Fut>(&self, mut probe: F) -> PollOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        for attempt in 1..=self.attempts {
            sleep(self.interval).await;
            if let Some(value) = probe(attempt).await {
                return PollOutcome::Bound { value, attempt };
            }
        }
        PollOutcome::TimedOut {
            attempts: self.attempts,
        }
    }
}

/// Re-read the exposure object until the allocator fills in an address.
pub async fn wait_for_address(
    services: &dyn ObjectStore<Service>,
    name: &str,
    policy: RetryPolicy,
) -> PollOutcome<String> {
    policy
        .poll(|attempt| async move {
            match services.get(name).await {
                Ok(Some(svc)) => {
                    let address = allocated_address(&svc);
                    if address.is_none() {
                        debug!(name = %name, attempt, "No address assigned yet");
                    }
                    address
                }
                Ok(None) => {
                    warn!(name = %name, attempt, "Exposure object disappeared while polling");
                    None
                }
                Err(e) => {
                    warn!(name = %name, attempt, error = %e, "Failed to read exposure object");
                    None
                }
            }
        })
        .await
}

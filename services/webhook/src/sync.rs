//! Proxy Resource Synchronizer
//!
//! Get-then-branch create-or-update. Absent objects are created; present
//! ones are replaced wholesale with the desired state, carrying over the live
//! `resourceVersion` so a concurrent writer surfaces as a conflict instead of
//! being silently overwritten.

use kube::{Resource, ResourceExt};
use serde::Serialize;
use tracing::{debug, info};

use crate::store::ObjectStore;

/// What [`ensure`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Created,
    Updated,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::Created => write!(f, "created"),
            SyncOutcome::Updated => write!(f, "updated"),
        }
    }
}

/// Converge the object named by `desired` onto `desired`.
pub async fn ensure<K>(store: &dyn ObjectStore<K>, mut desired: K) -> Result<SyncOutcome, kube::Error>
where
    K: Resource<DynamicType = ()> + Send + Sync + 'static,
{
    let name = desired.name_any();
    let kind = K::kind(&());

    match store.get(&name).await? {
        None => {
            store.create(&desired).await?;
            info!(kind = %kind, name = %name, "Created proxy object");
            Ok(SyncOutcome::Created)
        }
        Some(existing) => {
            desired.meta_mut().resource_version = existing.meta().resource_version.clone();
            debug!(
                kind = %kind,
                name = %name,
                resource_version = ?existing.meta().resource_version,
                "Replacing proxy object"
            );
            store.replace(&name, &desired).await?;
            info!(kind = %kind, name = %name, "Updated proxy object");
            Ok(SyncOutcome::Updated)
        }
    }
}

//! Object storage seam
//!
//! The broker talks to the hub cluster through [`ObjectStore`] so the
//! synchronization logic can run against the real API server or an
//! in-memory table in tests.

use std::fmt::Debug;

use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Minimal name-addressed access to one namespaced resource kind.
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Fetch an object, `None` if it does not exist.
    async fn get(&self, name: &str) -> Result<Option<K>, kube::Error>;

    async fn create(&self, obj: &K) -> Result<K, kube::Error>;

    /// Overwrite an existing object with `obj`.
    async fn replace(&self, name: &str, obj: &K) -> Result<K, kube::Error>;
}

#[async_trait]
impl<K> ObjectStore<K> for Api<K>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<K>, kube::Error> {
        self.get_opt(name).await
    }

    async fn create(&self, obj: &K) -> Result<K, kube::Error> {
        Api::create(self, &PostParams::default(), obj).await
    }

    async fn replace(&self, name: &str, obj: &K) -> Result<K, kube::Error> {
        Api::replace(self, name, &PostParams::default(), obj).await
    }
}

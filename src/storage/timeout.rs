//! Per-call deadline for any [`SecretStore`]

use super::{SecretStore, StoreError};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Wraps a store so that no single call outlives `limit`
pub struct TimeoutStore {
    inner: Arc<dyn SecretStore>,
    limit: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn SecretStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.limit, call)
            .await
            .map_err(|_| StoreError::Timeout(self.limit))?
    }
}

#[async_trait]
impl SecretStore for TimeoutStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.bounded(self.inner.put(key, value, ttl)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.bounded(self.inner.get(key)).await
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.bounded(self.inner.touch(key, ttl)).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.bounded(self.inner.delete(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySecretStore;

    /// Store whose every call hangs
    struct StalledStore;

    #[async_trait]
    impl SecretStore for StalledStore {
        async fn put(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            std::future::pending().await
        }

        async fn touch(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
            std::future::pending().await
        }

        async fn delete(&self, _: &str) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_call_times_out() {
        let store = TimeoutStore::new(Arc::new(StalledStore), Duration::from_millis(50));
        assert!(matches!(
            store.get("secret:u").await,
            Err(StoreError::Timeout(d)) if d == Duration::from_millis(50)
        ));
    }

    #[tokio::test]
    async fn test_passes_through() {
        let store = TimeoutStore::new(
            Arc::new(MemorySecretStore::new()),
            Duration::from_secs(1),
        );
        store.put("k", "v", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }
}

//! In-process TTL cache
//!
//! Backs the stdio server and the test suite. Deadlines use the tokio
//! clock so tests can pause and advance time.

use super::{SecretStore, StoreError, MAX_TTL};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

struct Entry {
    value: String,
    deadline: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.deadline
    }
}

fn deadline(now: Instant, ttl: Duration) -> Instant {
    now + ttl.min(MAX_TTL)
}

/// A [`SecretStore`] held in memory
#[derive(Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    /// Purge expired entries every `period` until the store is dropped
    pub fn spawn_purge_task(store: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    let remaining = store.entries.read().len();
                    debug!(purged, remaining, "Purged expired cache entries");
                }
            }
        })
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let entry = Entry {
            value: value.to_string(),
            deadline: deadline(Instant::now(), ttl),
        };
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.deadline = deadline(now, ttl);
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemorySecretStore::new();
        store.put("a", "1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.put("a", "2", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.delete("a").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemorySecretStore::new();
        store.put("a", "1", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get("a").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_extends_deadline() {
        let store = MemorySecretStore::new();
        store.put("a", "1", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.touch("a", Duration::from_secs(10)).await.unwrap());

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.get("a").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(store.get("a").await.unwrap().is_none());
        assert!(!store.touch("a", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemorySecretStore::new();
        store.put("short", "1", Duration::from_secs(1)).await.unwrap();
        store.put("long", "2", Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries.read().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_task_reclaims_expired_entries() {
        let store = Arc::new(MemorySecretStore::new());
        let task = MemorySecretStore::spawn_purge_task(&store, Duration::from_secs(60));
        for i in 0..100 {
            store
                .put(&format!("secret:{}", i), "x", Duration::from_secs(30))
                .await
                .unwrap();
        }
        store.put("keep", "1", Duration::from_secs(600)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.entries.read().len(), 1);

        // the task ends once the store is gone
        drop(store);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_is_clamped() {
        let store = MemorySecretStore::new();
        store.put("a", "1", Duration::MAX).await.unwrap();
        assert!(store.touch("a", Duration::MAX).await.unwrap());

        tokio::time::advance(MAX_TTL - Duration::from_secs(1)).await;
        assert!(store.get("a").await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("a").await.unwrap().is_none());
    }
}

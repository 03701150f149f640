//! TTL cache backends for session secrets and capability lists
//!
//! The cache is the only cross-request state bouncer relies on. Login,
//! logout and the sliding session window are all expressed as per-key
//! `put`/`get`/`touch`/`delete` calls against a [`SecretStore`].

mod memory;
mod timeout;

pub use memory::MemorySecretStore;
pub use timeout::TimeoutStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Longest TTL a store honours; longer ones are clamped
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Cache-related errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Contract over an external TTL cache
///
/// Implementations must be atomic per key; no ordering is required across
/// keys.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Fetch the value under `key`; expired keys are a miss
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Reset the TTL of `key`; returns `false` if the key was absent
    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Cache key namespaces, so usernames and list ids cannot collide
pub mod keys {
    pub fn secret(username: &str) -> String {
        format!("secret:{}", username)
    }

    pub fn revalidation(username: &str) -> String {
        format!("revalidation:{}", username)
    }

    pub fn one_time(username: &str) -> String {
        format!("onetime:{}", username)
    }

    pub fn key_list(id: &str) -> String {
        format!("keylist:{}", id)
    }
}

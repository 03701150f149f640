//! Shareable capability keys
//!
//! An owner can delegate read access to specific systems by handing out
//! `"<id> <key>"` pairs. All keys minted by one owner live in a single
//! cached [`KeyList`] whose id is derived from the owner's username, so the
//! whole list expires (or is revoked) at once.

use crate::access::covers;
use crate::crypto::{derive_secret, HashAlgorithm};
use crate::storage::{keys, SecretStore, StoreError};
use crate::AuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Cached bundle of delegated keys for one owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyList {
    pub id: String,
    /// key -> system URI
    pub pairs: BTreeMap<String, String>,
    pub expires_at: DateTime<Utc>,
}

impl KeyList {
    fn remaining(&self) -> Option<Duration> {
        (self.expires_at - Utc::now())
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
    }
}

/// One delegated key, handed out as `"<id> <key>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityKey {
    pub id: String,
    pub key: String,
    pub system: String,
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.key)
    }
}

/// Id of the key list owned by `owner`
pub fn list_id(owner: &str) -> String {
    HashAlgorithm::Sha1.hash(owner)
}

/// Mints, redeems and revokes capability keys
pub struct CapabilityKeyStore {
    store: Arc<dyn SecretStore>,
    ttl: Duration,
}

impl CapabilityKeyStore {
    pub fn new(store: Arc<dyn SecretStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Add one key per system to `owner`'s list and reset its lifetime
    pub async fn mint(
        &self,
        owner: &str,
        systems: &[String],
    ) -> Result<Vec<CapabilityKey>, AuthError> {
        let id = list_id(owner);
        let mut list = self.fetch(&id).await?.unwrap_or_else(|| KeyList {
            id: id.clone(),
            pairs: BTreeMap::new(),
            expires_at: Utc::now(),
        });

        let mut minted = Vec::with_capacity(systems.len());
        for system in systems {
            let key = derive_secret(owner);
            list.pairs.insert(key.clone(), system.clone());
            minted.push(CapabilityKey {
                id: id.clone(),
                key,
                system: system.clone(),
            });
        }

        list.expires_at = Utc::now()
            + chrono::Duration::from_std(self.ttl)
                .map_err(|e| AuthError::Internal(format!("capability ttl: {}", e)))?;
        self.write(&list, self.ttl).await?;

        info!(owner = %owner, keys = minted.len(), "Minted capability keys");
        Ok(minted)
    }

    /// Resolve a presented `"<id> <key>"` against `requested`.
    ///
    /// Delegated access is always read-only.
    pub async fn redeem(&self, compound: &str, requested: &str) -> Result<Value, AuthError> {
        let (id, key) = split_compound(compound)?;
        let list = self
            .fetch(id)
            .await?
            .ok_or(AuthError::CapabilityNotFound)?;
        let target = list
            .pairs
            .get(key)
            .ok_or(AuthError::InvalidCapabilityKey)?;

        if covers(target, requested) {
            Ok(json!(["read"]))
        } else {
            debug!(target = %target, requested = %requested, "Capability key does not cover system");
            Err(AuthError::Forbidden)
        }
    }

    /// Remove a single key, keeping the rest of the list and its deadline
    pub async fn revoke_key(&self, id: &str, key: &str) -> Result<(), AuthError> {
        let mut list = self
            .fetch(id)
            .await?
            .ok_or(AuthError::CapabilityNotFound)?;
        if list.pairs.remove(key).is_none() {
            return Err(AuthError::InvalidCapabilityKey);
        }

        match list.remaining() {
            Some(ttl) if !list.pairs.is_empty() => self.write(&list, ttl).await?,
            _ => self.store.delete(&keys::key_list(id)).await?,
        }
        Ok(())
    }

    /// Drop every key `owner` has handed out
    pub async fn revoke_all(&self, owner: &str) -> Result<(), AuthError> {
        self.store.delete(&keys::key_list(&list_id(owner))).await?;
        info!(owner = %owner, "Revoked all capability keys");
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<KeyList>, AuthError> {
        let Some(blob) = self.store.get(&keys::key_list(id)).await? else {
            return Ok(None);
        };
        let list = serde_json::from_str(&blob).map_err(StoreError::from)?;
        Ok(Some(list))
    }

    async fn write(&self, list: &KeyList, ttl: Duration) -> Result<(), AuthError> {
        let blob = serde_json::to_string(list).map_err(StoreError::from)?;
        self.store.put(&keys::key_list(&list.id), &blob, ttl).await?;
        Ok(())
    }
}

/// Split `"<id> <key>"` into its two parts
pub fn split_compound(compound: &str) -> Result<(&str, &str), AuthError> {
    let mut parts = compound.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(id), Some(key), None) => Ok((id, key)),
        _ => Err(AuthError::InvalidCapabilityKey),
    }
}

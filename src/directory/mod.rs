//! User and group directory
//!
//! The directory is a document store owned by someone else; bouncer only
//! reads from it. Documents are decoded into typed records whose optional
//! fields have defined defaults, so a missing key never faults.

mod memory;
mod timeout;

pub use memory::MemoryDirectory;
pub use timeout::TimeoutDirectory;

use crate::AccessEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Directory-related errors
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Directory call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for DirectoryError {
    fn from(err: serde_json::Error) -> Self {
        DirectoryError::InvalidDocument(err.to_string())
    }
}

/// A user document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// User id (the login name, usually an email address)
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    /// Hex digest of `password + salt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Digest algorithm name; anything unrecognized means sha512
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Password salt; absent on records that predate salting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    /// Disabled accounts cannot log in. A record without the flag is
    /// treated as disabled.
    #[serde(default)]
    pub active: bool,
    /// Ids of the groups the user belongs to
    #[serde(default)]
    pub groups: Vec<String>,
    /// Grants held directly by the user
    #[serde(default)]
    pub systems: Vec<AccessEntry>,
    /// Link to the user's description, copied into issued tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl UserRecord {
    /// Salt to use when hashing, empty for unsalted records
    pub fn salt(&self) -> &str {
        self.salt.as_deref().unwrap_or("")
    }
}

/// A group document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub systems: Vec<AccessEntry>,
}

/// Read interface to the user/group directory
#[async_trait]
pub trait Directory: Send + Sync {
    /// Fetch a user by id
    async fn get_user(&self, id: &str) -> Result<UserRecord, DirectoryError>;

    /// Fetch several groups in one batched call.
    ///
    /// Groups are returned in the order of `ids`; unknown ids are skipped.
    async fn get_groups(&self, ids: &[String]) -> Result<Vec<GroupRecord>, DirectoryError>;
}

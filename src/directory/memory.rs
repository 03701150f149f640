//! In-memory directory, optionally loaded from a JSON document
//!
//! File layout:
//!
//! ```json
//! { "users": [ { "_id": "...", ... } ], "groups": [ { "_id": "...", ... } ] }
//! ```

use super::{Directory, DirectoryError, GroupRecord, UserRecord};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

/// On-disk format for a directory snapshot
#[derive(Debug, Default, Serialize, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    users: Vec<UserRecord>,
    #[serde(default)]
    groups: Vec<GroupRecord>,
}

/// A [`Directory`] held in memory
#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
    groups: RwLock<HashMap<String, GroupRecord>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a directory snapshot from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let content = fs::read_to_string(path.as_ref()).await?;
        Self::parse(&content)
    }

    /// Parse a directory snapshot from a JSON string
    pub fn parse(content: &str) -> Result<Self, DirectoryError> {
        let file: DirectoryFile = serde_json::from_str(content)?;
        let directory = Self::new();
        for user in file.users {
            directory.insert_user(user);
        }
        for group in file.groups {
            directory.insert_group(group);
        }
        Ok(directory)
    }

    /// Add or replace a user (ids are stored lower-cased)
    pub fn insert_user(&self, mut user: UserRecord) {
        user.id = user.id.to_lowercase();
        self.users.write().insert(user.id.clone(), user);
    }

    /// Add or replace a group
    pub fn insert_group(&self, group: GroupRecord) {
        self.groups.write().insert(group.id.clone(), group);
    }

    /// Flip a user's `active` flag; returns `false` for unknown users
    pub fn set_active(&self, id: &str, active: bool) -> bool {
        match self.users.write().get_mut(id) {
            Some(user) => {
                user.active = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get_user(&self, id: &str) -> Result<UserRecord, DirectoryError> {
        self.users
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))
    }

    async fn get_groups(&self, ids: &[String]) -> Result<Vec<GroupRecord>, DirectoryError> {
        let groups = self.groups.read();
        Ok(ids.iter().filter_map(|id| groups.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccessEntry;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SNAPSHOT: &str = r#"{
        "users": [
            { "_id": "Ola@Example.org", "active": true, "groups": ["b", "a"] }
        ],
        "groups": [
            { "_id": "a", "systems": [{ "uri": "https://a.example.org/", "rights": "read" }] },
            { "_id": "b", "systems": [] }
        ]
    }"#;

    #[tokio::test]
    async fn test_parse_and_lookup() {
        let directory = MemoryDirectory::parse(SNAPSHOT).unwrap();

        let user = directory.get_user("ola@example.org").await.unwrap();
        assert!(user.active);

        let missing = directory.get_user("nobody").await;
        assert!(matches!(missing, Err(DirectoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_groups_follow_requested_order() {
        let directory = MemoryDirectory::parse(SNAPSHOT).unwrap();
        let ids = vec!["b".to_string(), "missing".to_string(), "a".to_string()];
        let groups = directory.get_groups(&ids).await.unwrap();
        let order: Vec<_> = groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();

        let directory = MemoryDirectory::load(file.path()).await.unwrap();
        let groups = directory.get_groups(&["a".to_string()]).await.unwrap();
        assert_eq!(
            groups[0].systems,
            vec![AccessEntry::new("https://a.example.org/", "read")]
        );
    }

    #[tokio::test]
    async fn test_set_active() {
        let directory = MemoryDirectory::parse(SNAPSHOT).unwrap();
        assert!(directory.set_active("ola@example.org", false));
        assert!(!directory.get_user("ola@example.org").await.unwrap().active);
        assert!(!directory.set_active("nobody", false));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            MemoryDirectory::parse("not json"),
            Err(DirectoryError::InvalidDocument(_))
        ));
    }
}

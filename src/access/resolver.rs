//! Resolution of a user's effective access list

use crate::directory::{Directory, UserRecord};
use crate::{AccessEntry, AuthError};
use std::sync::Arc;

/// Merges group grants and direct grants into one access list
pub struct AccessResolver {
    directory: Arc<dyn Directory>,
}

impl AccessResolver {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Resolve the ordered, URI-deduplicated access list for `user`.
    ///
    /// Group grants come first, in the order the groups are returned.
    /// Direct grants then replace a group grant with the same URI in place
    /// or are appended.
    pub async fn resolve(&self, user: &UserRecord) -> Result<Vec<AccessEntry>, AuthError> {
        let mut systems = Vec::new();

        if !user.groups.is_empty() {
            let groups = self.directory.get_groups(&user.groups).await?;
            for group in groups {
                overlay(&mut systems, group.systems);
            }
        }

        overlay(&mut systems, user.systems.iter().cloned());
        Ok(systems)
    }
}

/// Insert `entries` into `systems`, replacing same-URI entries in place
pub fn overlay(systems: &mut Vec<AccessEntry>, entries: impl IntoIterator<Item = AccessEntry>) {
    for entry in entries {
        match systems.iter_mut().find(|existing| existing.uri == entry.uri) {
            Some(existing) => *existing = entry,
            None => systems.push(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryError, GroupRecord, MemoryDirectory};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Directory that counts calls and can be told to fail
    struct CountingDirectory {
        inner: MemoryDirectory,
        group_calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Directory for CountingDirectory {
        async fn get_user(&self, id: &str) -> Result<UserRecord, DirectoryError> {
            self.inner.get_user(id).await
        }

        async fn get_groups(&self, ids: &[String]) -> Result<Vec<GroupRecord>, DirectoryError> {
            self.group_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DirectoryError::Unavailable("503".to_string()));
            }
            self.inner.get_groups(ids).await
        }
    }

    fn directory(fail: bool) -> Arc<CountingDirectory> {
        let inner = MemoryDirectory::new();
        inner.insert_group(GroupRecord {
            id: "readers".to_string(),
            systems: vec![
                AccessEntry::new("sys1", "read"),
                AccessEntry::new("https://a.example.org/*", "read"),
            ],
        });
        inner.insert_group(GroupRecord {
            id: "editors".to_string(),
            systems: vec![
                AccessEntry::new("https://a.example.org/*", "write"),
                AccessEntry::new("https://b.example.org/x", "write"),
            ],
        });
        Arc::new(CountingDirectory {
            inner,
            group_calls: AtomicUsize::new(0),
            fail,
        })
    }

    fn user(groups: &[&str], systems: Vec<AccessEntry>) -> UserRecord {
        UserRecord {
            id: "ola@example.org".to_string(),
            active: true,
            groups: groups.iter().map(|g| g.to_string()).collect(),
            systems,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_direct_grant_overrides_group() {
        let dir = directory(false);
        let resolver = AccessResolver::new(dir.clone());
        let resolved = resolver
            .resolve(&user(&["readers"], vec![AccessEntry::new("sys1", "admin")]))
            .await
            .unwrap();

        let sys1: Vec<_> = resolved.iter().filter(|e| e.uri == "sys1").collect();
        assert_eq!(sys1.len(), 1);
        assert_eq!(sys1[0].rights, json!("admin"));
        assert_eq!(resolved[0].uri, "sys1");
    }

    #[tokio::test]
    async fn test_groups_fetched_in_one_batch() {
        let dir = directory(false);
        let resolver = AccessResolver::new(dir.clone());
        let resolved = resolver
            .resolve(&user(&["readers", "editors"], vec![]))
            .await
            .unwrap();

        assert_eq!(dir.group_calls.load(Ordering::SeqCst), 1);
        let uris: Vec<_> = resolved.iter().map(|e| e.uri.as_str()).collect();
        assert_eq!(
            uris,
            vec!["sys1", "https://a.example.org/*", "https://b.example.org/x"]
        );
        // later group wins for a shared URI
        assert_eq!(resolved[1].rights, json!("write"));
    }

    #[tokio::test]
    async fn test_direct_grants_appended_in_order() {
        let dir = directory(false);
        let resolver = AccessResolver::new(dir.clone());
        let resolved = resolver
            .resolve(&user(
                &[],
                vec![
                    AccessEntry::new("https://c.example.org/", "read"),
                    AccessEntry::new("https://d.example.org/", "read"),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(dir.group_calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].uri, "https://c.example.org/");
    }

    #[tokio::test]
    async fn test_directory_failure_propagates() {
        let resolver = AccessResolver::new(directory(true));
        let result = resolver.resolve(&user(&["readers"], vec![])).await;
        assert!(matches!(result, Err(AuthError::Directory(_))));
    }
}

//! Per-call deadline for any [`Directory`]

use super::{Directory, DirectoryError, GroupRecord, UserRecord};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Wraps a directory so that no single lookup outlives `limit`
pub struct TimeoutDirectory {
    inner: Arc<dyn Directory>,
    limit: Duration,
}

impl TimeoutDirectory {
    pub fn new(inner: Arc<dyn Directory>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl Directory for TimeoutDirectory {
    async fn get_user(&self, id: &str) -> Result<UserRecord, DirectoryError> {
        tokio::time::timeout(self.limit, self.inner.get_user(id))
            .await
            .map_err(|_| DirectoryError::Timeout(self.limit))?
    }

    async fn get_groups(&self, ids: &[String]) -> Result<Vec<GroupRecord>, DirectoryError> {
        tokio::time::timeout(self.limit, self.inner.get_groups(ids))
            .await
            .map_err(|_| DirectoryError::Timeout(self.limit))?
    }
}

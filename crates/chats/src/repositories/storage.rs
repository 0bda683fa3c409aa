//! Port for object storage.

use async_trait::async_trait;
use bytes::Bytes;

use crate::types::{ChatResult, ProgressReporter};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key` and return its public URL.
    ///
    /// Implementations advance `progress` while sending and call
    /// [`ProgressReporter::complete`] only once the store has acknowledged.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        progress: &ProgressReporter,
    ) -> ChatResult<String>;

    async fn delete(&self, bucket: &str, key: &str) -> ChatResult<()>;
}

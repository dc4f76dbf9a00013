use crate::error::Result;
use async_trait::async_trait;

/// Path-addressed blob store.
///
/// `put` is idempotent by content hash under a mutable directory entry,
/// so re-writing the same bytes at the same path is always safe.
/// `delete` is best-effort; stores may garbage-collect lazily.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()>;

    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Convenience existence probe on top of `get`.
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.get(path).await {
            Ok(_) => Ok(true),
            Err(crate::StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<T: StorageAdapter + ?Sized> StorageAdapter for std::sync::Arc<T> {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        (**self).put(path, bytes).await
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        (**self).get(path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list(prefix).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        (**self).delete(path).await
    }
}

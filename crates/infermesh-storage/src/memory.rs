use crate::adapter::StorageAdapter;
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory store for tests and local single-process runs.
#[derive(Default)]
pub struct MemoryStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl StorageAdapter for MemoryStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        self.blobs.insert(path.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self
            .blobs
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key.starts_with(prefix))
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.blobs.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        store.put("a/b", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.get("nope").await, Err(StorageError::NotFound(_))));
        assert!(!store.exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = MemoryStore::new();
        store.put("a", b"x".to_vec()).await.unwrap();
        store.put("a", b"x".to_vec()).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_prefix_sorted() {
        let store = MemoryStore::new();
        store.put("checkpoints/h/1/delta-2", vec![2]).await.unwrap();
        store.put("checkpoints/h/1/delta-1", vec![1]).await.unwrap();
        store.put("other/x", vec![0]).await.unwrap();
        let listed = store.list("checkpoints/h/1/").await.unwrap();
        assert_eq!(listed, vec!["checkpoints/h/1/delta-1", "checkpoints/h/1/delta-2"]);
    }

    #[tokio::test]
    async fn test_delete_is_best_effort() {
        let store = MemoryStore::new();
        store.delete("missing").await.unwrap();
        store.put("a", vec![1]).await.unwrap();
        store.delete("a").await.unwrap();
        assert!(!store.exists("a").await.unwrap());
    }
}

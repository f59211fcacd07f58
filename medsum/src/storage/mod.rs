//! Blob storage collaborator used by the cloud OCR engine to stage
//! documents and collect results.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{MedsumError, Result};

mod gcs;

pub use gcs::GcsBlobStore;

/// Narrow interface over a remote bucket. Keys are forward-slash paths.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
    async fn download(&self, key: &str) -> Result<Vec<u8>>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory store for tests and offline development.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        self.objects
            .write()
            .unwrap()
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| MedsumError::Storage(format!("Object not found: {key}")))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects
            .write()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| MedsumError::Storage(format!("Object not found: {key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryBlobStore::new();
        store
            .upload("job/page-1.tiff", vec![1, 2, 3], "image/tiff")
            .await
            .unwrap();

        assert_eq!(store.download("job/page-1.tiff").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(store.list("job/").await.unwrap(), vec!["job/page-1.tiff"]);

        store.delete("job/page-1.tiff").await.unwrap();
        assert!(store.is_empty());
        assert!(store.download("job/page-1.tiff").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_list_respects_prefix() {
        let store = MemoryBlobStore::new();
        store.upload("a/1", vec![0], "text/plain").await.unwrap();
        store.upload("a/2", vec![0], "text/plain").await.unwrap();
        store.upload("b/1", vec![0], "text/plain").await.unwrap();

        assert_eq!(store.list("a/").await.unwrap().len(), 2);
        assert_eq!(store.list("b/").await.unwrap(), vec!["b/1"]);
        assert!(store.list("c/").await.unwrap().is_empty());
    }
}

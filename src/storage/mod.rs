//! Audio blob storage
//!
//! The core only needs `put(key, bytes) -> url` plus a read path for the
//! streaming route. The default implementation keeps blobs on the local
//! filesystem under the configured storage directory; swapping in an object
//! store is a matter of implementing the trait.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a blob under `key`, returning the URL it is served from
    async fn put(&self, key: &str, bytes: Bytes) -> Result<String, StorageError>;

    /// Fetch a stored blob
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;
}

/// Filesystem-backed store rooted at a single directory
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Resolve a key to a path inside the root. Keys may contain forward
    /// slashes for nesting but must not escape the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if key.is_empty() || escapes {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<String, StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;

        debug!(key, size = bytes.len(), "stored audio blob");
        Ok(format!("/stream/{}", key))
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).unwrap();

        let url = store
            .put("tracks/aabbccdd.opus", Bytes::from_static(b"audio-bytes"))
            .await
            .unwrap();
        assert_eq!(url, "/stream/tracks/aabbccdd.opus");

        let data = store.get("tracks/aabbccdd.opus").await.unwrap();
        assert_eq!(&data[..], b"audio-bytes");
    }

    #[tokio::test]
    async fn test_get_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).unwrap();

        let err = store.get("tracks/nope.opus").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).unwrap();

        for key in ["../escape.opus", "/absolute.opus", ""] {
            let err = store.put(key, Bytes::new()).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey(_)), "key: {}", key);
        }
    }
}

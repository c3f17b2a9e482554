//! In-memory blob store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::{Blob, BlobStore, StorageError};

/// Blob store that keeps every blob in memory.
///
/// Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` at `path` without going through the async trait.
    pub fn insert(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        self.blobs.write().insert(path.into(), data.into());
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.blobs.read().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.blobs.read().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn open(&self, path: &str) -> Result<Arc<dyn Blob>, StorageError> {
        let data = self.get(path).ok_or_else(|| StorageError::NotFound {
            path: path.to_string(),
        })?;
        Ok(Arc::new(InMemoryBlob { data }))
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
        self.insert(path, data);
        Ok(())
    }
}

struct InMemoryBlob {
    data: Bytes,
}

#[async_trait]
impl Blob for InMemoryBlob {
    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_at(&self, offset: u64, len: usize) -> Result<Bytes, StorageError> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = start.saturating_add(len);
        if end > self.data.len() {
            return Err(StorageError::io(
                format!(
                    "reading {len} bytes at offset {offset} from blob of length {}",
                    self.data.len()
                ),
                std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
            ));
        }
        Ok(self.data.slice(start..end))
    }
}

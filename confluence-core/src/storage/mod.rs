//! Metainfo storage.
//!
//! Cached metainfo lives under `<cache_dir>/<infohash>.torrent`, either as a
//! plain file or as an entry in a pluggable [`BlobStore`].

pub mod memory;
pub mod metainfo_store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
pub use memory::InMemoryBlobStore;
pub use metainfo_store::{MetainfoBackend, MetainfoStore};

use crate::torrent::TorrentError;

/// Random-access blob storage addressed by path strings.
///
/// Implementations must report a missing path as `StorageError::NotFound` so
/// callers can tell a cache miss from a broken backend.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Opens the blob stored at `path`.
    ///
    /// # Errors
    ///
    /// - `StorageError::NotFound` - Nothing is stored at `path`
    /// - `StorageError::Io` - Backend failed to open the blob
    async fn open(&self, path: &str) -> Result<Arc<dyn Blob>, StorageError>;

    /// Stores `data` at `path`, replacing any existing blob.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - Backend failed to write the blob
    async fn put(&self, path: &str, data: Bytes) -> Result<(), StorageError>;
}

/// An opened blob.
#[async_trait]
pub trait Blob: Send + Sync {
    /// Total length in bytes.
    fn length(&self) -> u64;

    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - Range is out of bounds or the read failed
    async fn read_at(&self, offset: u64, len: usize) -> Result<Bytes, StorageError>;
}

/// Errors that occur while loading or persisting metainfo.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Nothing is stored under the requested path
    #[error("Not found: {path}")]
    NotFound {
        /// Path that was looked up
        path: String,
    },

    /// I/O failure, annotated with the operation that failed
    #[error("{context}: {source}")]
    Io {
        /// Operation and path that failed
        context: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Stored bytes are not a valid metainfo file
    #[error("loading metainfo: {0}")]
    InvalidMetainfo(#[from] TorrentError),
}

impl StorageError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Checks if this error only means the entry does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound { .. } => true,
            StorageError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            StorageError::InvalidMetainfo(_) => false,
        }
    }
}

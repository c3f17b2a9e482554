//! Confluence Core - torrent references and metainfo persistence
//!
//! This crate provides the building blocks behind the Confluence HTTP layer:
//! info hash and magnet parsing, the metainfo codec, a reference-counted
//! torrent registry, the torrent client seam with an in-process engine, and
//! metainfo storage backends used to hydrate and persist torrents.

pub mod config;
pub mod engine;
pub mod storage;
pub mod torrent;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::ConfluenceConfig;
pub use engine::{Torrent, TorrentClient, TorrentEngineHandle, spawn_torrent_engine};
pub use storage::{MetainfoBackend, MetainfoStore, StorageError};
pub use torrent::{InfoHash, MagnetLink, MetaInfo, RefRegistry, TorrentError};

/// Core errors that can bubble up from any Confluence subsystem.
#[derive(Debug, thiserror::Error)]
pub enum ConfluenceError {
    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfluenceError {
    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ConfluenceError::Configuration { .. }
                | ConfluenceError::Torrent(
                    TorrentError::InvalidInfoHash { .. } | TorrentError::InvalidMagnetLink { .. }
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, ConfluenceError>;

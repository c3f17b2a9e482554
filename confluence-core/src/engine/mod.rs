//! Torrent client seam and the in-process engine behind it
//!
//! The HTTP layer talks to the torrent client only through [`TorrentClient`].
//! [`spawn_torrent_engine`] provides an actor-backed client that owns torrent
//! handles and their lifecycle signals without doing any protocol work.

pub mod actor;
pub mod commands;
pub mod core;
pub mod handle;
pub mod torrent;

use std::sync::Arc;

use async_trait::async_trait;

pub use actor::spawn_torrent_engine;
pub use self::core::TorrentEngine;
pub use handle::TorrentEngineHandle;
pub use torrent::Torrent;

use crate::torrent::{InfoHash, TorrentError};

/// Operations the HTTP layer needs from a torrent client.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Returns the torrent for `info_hash`, adding it if the client does not have it.
    ///
    /// The flag is `true` only for the call that added the torrent.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Client is no longer running
    async fn add_torrent_info_hash(
        &self,
        info_hash: InfoHash,
    ) -> Result<(Arc<Torrent>, bool), TorrentError>;

    /// Removes the torrent from the client and closes it.
    ///
    /// # Errors
    /// - `TorrentError::TorrentNotFound` - Client does not have the torrent
    /// - `TorrentError::EngineShutdown` - Client is no longer running
    async fn drop_torrent(&self, info_hash: InfoHash) -> Result<(), TorrentError>;
}

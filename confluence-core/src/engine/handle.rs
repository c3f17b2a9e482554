//! Handle for communicating with the torrent engine actor.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::TorrentClient;
use super::commands::TorrentEngineCommand;
use super::torrent::Torrent;
use crate::torrent::{InfoHash, TorrentError};

/// Handle for communicating with the torrent engine actor.
///
/// Cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct TorrentEngineHandle {
    sender: mpsc::Sender<TorrentEngineCommand>,
}

impl TorrentEngineHandle {
    /// Creates a new handle with the given command sender.
    pub fn new(sender: mpsc::Sender<TorrentEngineCommand>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> TorrentEngineCommand,
    ) -> Result<T, TorrentError> {
        let (responder, rx) = oneshot::channel();
        self.sender
            .send(build(responder))
            .await
            .map_err(|_| TorrentError::EngineShutdown)?;
        rx.await.map_err(|_| TorrentError::EngineShutdown)
    }

    /// Gets or adds the torrent for `info_hash`.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Actor is no longer running
    pub async fn add_info_hash(
        &self,
        info_hash: InfoHash,
    ) -> Result<(Arc<Torrent>, bool), TorrentError> {
        self.request(|responder| TorrentEngineCommand::AddInfoHash {
            info_hash,
            responder,
        })
        .await
    }

    /// Removes a torrent from the engine and closes it.
    ///
    /// # Errors
    /// - `TorrentError::TorrentNotFound` - Info hash not held by the engine
    /// - `TorrentError::EngineShutdown` - Actor is no longer running
    pub async fn drop_torrent(&self, info_hash: InfoHash) -> Result<(), TorrentError> {
        self.request(|responder| TorrentEngineCommand::DropTorrent {
            info_hash,
            responder,
        })
        .await?
    }

    /// Queues removal of a torrent without waiting for the actor.
    ///
    /// Usable from synchronous code. Commands sent after this returns, from
    /// any handle, are processed after the drop.
    ///
    /// # Errors
    /// - `TorrentError::EngineBusy` - Command queue is full, nothing was queued
    /// - `TorrentError::EngineShutdown` - Actor is no longer running
    pub fn queue_drop_torrent(&self, info_hash: InfoHash) -> Result<(), TorrentError> {
        let (responder, _) = oneshot::channel();
        self.sender
            .try_send(TorrentEngineCommand::DropTorrent {
                info_hash,
                responder,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TorrentError::EngineBusy,
                mpsc::error::TrySendError::Closed(_) => TorrentError::EngineShutdown,
            })
    }

    /// Looks up a torrent without adding it.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Actor is no longer running
    pub async fn torrent(&self, info_hash: InfoHash) -> Result<Option<Arc<Torrent>>, TorrentError> {
        self.request(|responder| TorrentEngineCommand::GetTorrent {
            info_hash,
            responder,
        })
        .await
    }

    /// Lists all torrents held by the engine, in no particular order.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Actor is no longer running
    pub async fn active_torrents(&self) -> Result<Vec<Arc<Torrent>>, TorrentError> {
        self.request(|responder| TorrentEngineCommand::ActiveTorrents { responder })
            .await
    }

    /// Closes all torrents and stops the actor.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Actor had already stopped
    pub async fn shutdown(&self) -> Result<(), TorrentError> {
        self.request(|responder| TorrentEngineCommand::Shutdown { responder })
            .await
    }
}

#[async_trait]
impl TorrentClient for TorrentEngineHandle {
    async fn add_torrent_info_hash(
        &self,
        info_hash: InfoHash,
    ) -> Result<(Arc<Torrent>, bool), TorrentError> {
        self.add_info_hash(info_hash).await
    }

    async fn drop_torrent(&self, info_hash: InfoHash) -> Result<(), TorrentError> {
        TorrentEngineHandle::drop_torrent(self, info_hash).await
    }
}

//! Command definitions for the torrent engine actor model.

use std::sync::Arc;

use tokio::sync::oneshot;

use super::torrent::Torrent;
use crate::torrent::{InfoHash, TorrentError};

/// Commands that can be sent to the torrent engine actor.
///
/// Each command carries a response channel for the actor to send back results.
pub enum TorrentEngineCommand {
    /// Get or add a torrent by info hash.
    AddInfoHash {
        info_hash: InfoHash,
        responder: oneshot::Sender<(Arc<Torrent>, bool)>,
    },
    /// Remove a torrent and close it.
    DropTorrent {
        info_hash: InfoHash,
        responder: oneshot::Sender<Result<(), TorrentError>>,
    },
    /// Look up a torrent without adding it.
    GetTorrent {
        info_hash: InfoHash,
        responder: oneshot::Sender<Option<Arc<Torrent>>>,
    },
    /// List every torrent the engine holds.
    ActiveTorrents {
        responder: oneshot::Sender<Vec<Arc<Torrent>>>,
    },
    /// Close all torrents and stop the actor.
    Shutdown { responder: oneshot::Sender<()> },
}

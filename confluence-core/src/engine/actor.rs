//! Actor implementation for the torrent engine.

use tokio::sync::mpsc;

use super::commands::TorrentEngineCommand;
use super::core::TorrentEngine;
use super::handle::TorrentEngineHandle;
use crate::config::ConfluenceConfig;

/// Spawns the torrent engine actor and returns its handle.
///
/// The actor processes commands sequentially, so concurrent adds of the same
/// info hash observe exactly one `is_new`.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() {
/// use confluence_core::config::ConfluenceConfig;
/// use confluence_core::engine::spawn_torrent_engine;
///
/// let handle = spawn_torrent_engine(&ConfluenceConfig::default());
/// # }
/// ```
pub fn spawn_torrent_engine(config: &ConfluenceConfig) -> TorrentEngineHandle {
    let (sender, receiver) = mpsc::channel(config.torrent.command_buffer);
    let engine = TorrentEngine::new();

    tokio::spawn(async move {
        run_actor_loop(engine, receiver).await;
    });

    TorrentEngineHandle::new(sender)
}

/// Runs the actor message loop until shutdown or until every handle is dropped.
async fn run_actor_loop(
    mut engine: TorrentEngine,
    mut receiver: mpsc::Receiver<TorrentEngineCommand>,
) {
    tracing::debug!("Torrent engine actor started");

    while let Some(command) = receiver.recv().await {
        if !handle_command(&mut engine, command) {
            break;
        }
    }

    engine.close_all();
    tracing::debug!("Torrent engine actor stopped");
}

/// Handles a single command. Returns false to shut down.
fn handle_command(engine: &mut TorrentEngine, command: TorrentEngineCommand) -> bool {
    match command {
        TorrentEngineCommand::AddInfoHash {
            info_hash,
            responder,
        } => {
            let _ = responder.send(engine.add_info_hash(info_hash));
        }

        TorrentEngineCommand::DropTorrent {
            info_hash,
            responder,
        } => {
            let _ = responder.send(engine.drop_torrent(info_hash));
        }

        TorrentEngineCommand::GetTorrent {
            info_hash,
            responder,
        } => {
            let _ = responder.send(engine.torrent(info_hash));
        }

        TorrentEngineCommand::ActiveTorrents { responder } => {
            let _ = responder.send(engine.active_torrents());
        }

        TorrentEngineCommand::Shutdown { responder } => {
            tracing::debug!("Torrent engine actor shutting down");
            engine.close_all();
            let _ = responder.send(());
            return false;
        }
    }

    true
}

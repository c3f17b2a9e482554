//! Torrent bookkeeping owned by the engine actor.

use std::collections::HashMap;
use std::sync::Arc;

use super::torrent::Torrent;
use crate::torrent::{InfoHash, TorrentError};

/// Torrents currently held by the engine.
///
/// Only ever touched from the actor task, so it needs no locking.
#[derive(Default)]
pub struct TorrentEngine {
    torrents: HashMap<InfoHash, Arc<Torrent>>,
}

impl TorrentEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the torrent for `info_hash`, creating it when absent.
    pub fn add_info_hash(&mut self, info_hash: InfoHash) -> (Arc<Torrent>, bool) {
        if let Some(torrent) = self.torrents.get(&info_hash) {
            return (Arc::clone(torrent), false);
        }

        let torrent = Arc::new(Torrent::new(info_hash));
        self.torrents.insert(info_hash, Arc::clone(&torrent));
        tracing::info!(%info_hash, active = self.torrents.len(), "Added torrent");
        (torrent, true)
    }

    /// Removes and closes a torrent.
    ///
    /// # Errors
    /// - `TorrentError::TorrentNotFound` - Torrent is not held by the engine
    pub fn drop_torrent(&mut self, info_hash: InfoHash) -> Result<(), TorrentError> {
        let torrent = self
            .torrents
            .remove(&info_hash)
            .ok_or(TorrentError::TorrentNotFound { info_hash })?;
        torrent.close();
        tracing::info!(%info_hash, active = self.torrents.len(), "Dropped torrent");
        Ok(())
    }

    pub fn torrent(&self, info_hash: InfoHash) -> Option<Arc<Torrent>> {
        self.torrents.get(&info_hash).cloned()
    }

    pub fn active_torrents(&self) -> Vec<Arc<Torrent>> {
        self.torrents.values().cloned().collect()
    }

    /// Closes every torrent, leaving the engine empty.
    pub fn close_all(&mut self) {
        for (_, torrent) in self.torrents.drain() {
            torrent.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_new_only_once() {
        let mut engine = TorrentEngine::new();
        let info_hash = InfoHash::new([1u8; 20]);

        let (first, new) = engine.add_info_hash(info_hash);
        assert!(new);
        let (second, new) = engine.add_info_hash(info_hash);
        assert!(!new);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_drop_closes_and_allows_readd() {
        let mut engine = TorrentEngine::new();
        let info_hash = InfoHash::new([2u8; 20]);

        let (torrent, _) = engine.add_info_hash(info_hash);
        engine.drop_torrent(info_hash).unwrap();
        assert!(torrent.is_closed());
        assert!(engine.torrent(info_hash).is_none());

        assert!(matches!(
            engine.drop_torrent(info_hash),
            Err(TorrentError::TorrentNotFound { .. })
        ));

        let (readded, new) = engine.add_info_hash(info_hash);
        assert!(new);
        assert!(!readded.is_closed());
    }
}

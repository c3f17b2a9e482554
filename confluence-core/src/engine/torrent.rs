//! Shared torrent handle handed out by the torrent client.

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::torrent::parsing::BencodeParser;
use crate::torrent::{InfoHash, MetaInfo, TorrentError, TorrentSpec, info_hash_of};

#[derive(Debug, Default)]
struct TorrentState {
    info_bytes: Option<Bytes>,
    display_name: Option<String>,
    trackers: Vec<Vec<String>>,
    web_seeds: Vec<String>,
}

/// One torrent as known to the torrent client.
///
/// Shared between every request that holds a reference on it. Exposes two
/// single-fire signals: info becoming known, and the client closing the torrent.
#[derive(Debug)]
pub struct Torrent {
    info_hash: InfoHash,
    state: Mutex<TorrentState>,
    got_info: watch::Sender<bool>,
    closed: watch::Sender<bool>,
}

impl Torrent {
    /// Creates a torrent that knows only its info hash.
    pub fn new(info_hash: InfoHash) -> Self {
        Self {
            info_hash,
            state: Mutex::new(TorrentState::default()),
            got_info: watch::Sender::new(false),
            closed: watch::Sender::new(false),
        }
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Installs the info dictionary, firing the info-known signal.
    ///
    /// Setting info on a torrent that already has it is a no-op.
    ///
    /// # Errors
    /// - `TorrentError::InvalidTorrentFile` - Bytes are not a bencoded dictionary
    /// - `TorrentError::InfoHashMismatch` - Bytes hash to a different info hash
    pub fn set_info_bytes(&self, info_bytes: impl Into<Bytes>) -> Result<(), TorrentError> {
        let info_bytes = info_bytes.into();
        let actual = info_hash_of(&info_bytes);
        if actual != self.info_hash {
            return Err(TorrentError::InfoHashMismatch {
                expected: self.info_hash,
                actual,
            });
        }
        BencodeParser::validate_info_dictionary(&info_bytes)?;

        {
            let mut state = self.state.lock();
            if state.info_bytes.is_some() {
                return Ok(());
            }
            state.info_bytes = Some(info_bytes);
        }

        tracing::debug!(info_hash = %self.info_hash, "Torrent info is now known");
        self.got_info.send_replace(true);
        Ok(())
    }

    /// Merges trackers, web seeds and display name from a spec.
    pub fn merge_spec(&self, spec: &TorrentSpec) {
        let mut state = self.state.lock();
        if state.display_name.is_none() {
            state.display_name.clone_from(&spec.display_name);
        }
        merge_tiers(&mut state.trackers, &spec.trackers);
        for seed in &spec.web_seeds {
            if !state.web_seeds.contains(seed) {
                state.web_seeds.push(seed.clone());
            }
        }
    }

    /// Adds tracker tiers, skipping URLs the torrent already announces to.
    pub fn add_trackers(&self, tiers: &[Vec<String>]) {
        merge_tiers(&mut self.state.lock().trackers, tiers);
    }

    pub fn trackers(&self) -> Vec<Vec<String>> {
        self.state.lock().trackers.clone()
    }

    pub fn web_seeds(&self) -> Vec<String> {
        self.state.lock().web_seeds.clone()
    }

    /// Display name from a merged spec, falling back to the info dictionary.
    pub fn name(&self) -> Option<String> {
        let state = self.state.lock();
        state.display_name.clone().or_else(|| {
            state
                .info_bytes
                .as_ref()
                .and_then(|bytes| BencodeParser::info_name(bytes))
        })
    }

    pub fn has_info(&self) -> bool {
        self.state.lock().info_bytes.is_some()
    }

    pub fn info_bytes(&self) -> Option<Bytes> {
        self.state.lock().info_bytes.clone()
    }

    /// Current metainfo, or `None` until info is known.
    pub fn metainfo(&self) -> Option<MetaInfo> {
        let state = self.state.lock();
        let info_bytes = state.info_bytes.clone()?;

        // Info bytes were verified against the info hash when installed.
        let mut metainfo = MetaInfo::from_info_bytes(info_bytes).ok()?;
        metainfo.announce = state.trackers.iter().flatten().next().cloned();
        metainfo.announce_list = state.trackers.clone();
        metainfo.url_list = state.web_seeds.clone();
        Some(metainfo)
    }

    /// Resolves once info is known. Returns immediately if it already is.
    pub async fn got_info(&self) {
        let mut rx = self.got_info.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail.
        let _ = rx.wait_for(|known| *known).await;
    }

    /// Resolves once the client has closed the torrent.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Marks the torrent closed. Called by the client when it drops the torrent.
    pub fn close(&self) {
        if !self.closed.send_replace(true) {
            tracing::debug!(info_hash = %self.info_hash, "Torrent closed");
        }
    }
}

fn merge_tiers(existing: &mut Vec<Vec<String>>, tiers: &[Vec<String>]) {
    for (index, tier) in tiers.iter().enumerate() {
        for url in tier {
            if url.is_empty() || existing.iter().flatten().any(|known| known == url) {
                continue;
            }
            if existing.len() <= index {
                existing.resize_with(index + 1, Vec::new);
            }
            existing[index].push(url.clone());
        }
    }
    existing.retain(|tier| !tier.is_empty());
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    const INFO: &[u8] =
        b"d6:lengthi1000e4:name8:test.txt12:piece lengthi32768e6:pieces20:12345678901234567890e";

    fn torrent() -> Torrent {
        Torrent::new(info_hash_of(INFO))
    }

    #[test]
    fn test_set_info_bytes_verifies_hash() {
        let wrong = Torrent::new(InfoHash::new([9u8; 20]));
        let err = wrong.set_info_bytes(INFO.to_vec()).unwrap_err();
        assert!(matches!(err, TorrentError::InfoHashMismatch { .. }));
        assert!(!wrong.has_info());

        let t = torrent();
        t.set_info_bytes(INFO.to_vec()).unwrap();
        assert!(t.has_info());
        assert_eq!(t.name().as_deref(), Some("test.txt"));
    }

    #[test]
    fn test_add_trackers_deduplicates() {
        let t = torrent();
        t.add_trackers(&[vec!["http://a/ann".to_string()]]);
        t.add_trackers(&[vec![
            "http://a/ann".to_string(),
            "http://b/ann".to_string(),
        ]]);
        t.add_trackers(&[vec![], vec!["udp://c:80".to_string()]]);

        assert_eq!(
            t.trackers(),
            vec![
                vec!["http://a/ann".to_string(), "http://b/ann".to_string()],
                vec!["udp://c:80".to_string()],
            ]
        );
    }

    #[test]
    fn test_metainfo_requires_info() {
        let t = torrent();
        assert!(t.metainfo().is_none());

        t.add_trackers(&[vec!["http://t.example/ann".to_string()]]);
        t.set_info_bytes(INFO.to_vec()).unwrap();

        let metainfo = t.metainfo().unwrap();
        assert_eq!(metainfo.info_bytes().as_ref(), INFO);
        assert_eq!(metainfo.announce.as_deref(), Some("http://t.example/ann"));
    }

    #[test]
    fn test_merge_spec_keeps_existing_name() {
        let t = torrent();
        t.merge_spec(&TorrentSpec {
            info_hash: t.info_hash(),
            display_name: Some("first".to_string()),
            trackers: vec![vec!["http://a/ann".to_string()]],
            web_seeds: vec!["http://seed/".to_string()],
        });
        t.merge_spec(&TorrentSpec {
            info_hash: t.info_hash(),
            display_name: Some("second".to_string()),
            trackers: vec![],
            web_seeds: vec!["http://seed/".to_string()],
        });

        assert_eq!(t.name().as_deref(), Some("first"));
        assert_eq!(t.web_seeds(), vec!["http://seed/".to_string()]);
    }

    #[tokio::test]
    async fn test_signals_fire() {
        let t = Arc::new(torrent());

        let waiter = {
            let t = Arc::clone(&t);
            tokio::spawn(async move { t.got_info().await })
        };
        t.set_info_bytes(INFO.to_vec()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        assert!(!t.is_closed());
        t.close();
        tokio::time::timeout(Duration::from_secs(1), t.closed())
            .await
            .unwrap();
        assert!(t.is_closed());
    }

    #[test]
    fn test_got_info_pending_until_set() {
        let t = torrent();
        let mut got_info = tokio_test::task::spawn(t.got_info());
        tokio_test::assert_pending!(got_info.poll());

        t.set_info_bytes(INFO.to_vec()).unwrap();
        assert!(got_info.is_woken());
        tokio_test::assert_ready!(got_info.poll());
    }
}

//! Torrent acquisition and first-sight hydration shared by every request.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use confluence_core::config::{ConfluenceConfig, MetainfoConfig};
use confluence_core::engine::{Torrent, TorrentClient};
use confluence_core::storage::{BlobStore, MetainfoBackend, MetainfoStore};
use confluence_core::torrent::{InfoHash, MetaInfo, Ref, RefRegistry, TorrentError};

/// Called once for each torrent the client reports as new.
///
/// Receives the cached metainfo when there is one and takes over hydration.
pub type OnNewTorrent = Arc<dyn Fn(&Arc<Torrent>, Option<&MetaInfo>) + Send + Sync>;

/// Called when the last reference to a torrent is released after its grace delay.
pub type OnTorrentGrace = Arc<dyn Fn(&Arc<Torrent>) + Send + Sync>;

/// Embedder-facing configuration for [`Handler`].
#[derive(Clone)]
pub struct HandlerConfig {
    pub cache_dir: PathBuf,
    pub blob_store: Option<Arc<dyn BlobStore>>,
    /// Suffix of filesystem temp files written before rename
    pub temp_file_suffix: &'static str,
    pub grace_delay: Duration,
    pub on_new_torrent: Option<OnNewTorrent>,
    pub on_torrent_grace: Option<OnTorrentGrace>,
}

impl HandlerConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            blob_store: None,
            temp_file_suffix: MetainfoConfig::default().temp_file_suffix,
            grace_delay: Duration::ZERO,
            on_new_torrent: None,
            on_torrent_grace: None,
        }
    }

    /// Takes the metainfo settings and grace delay from application configuration.
    pub fn from_config(config: &ConfluenceConfig) -> Self {
        Self {
            temp_file_suffix: config.metainfo.temp_file_suffix,
            grace_delay: config.torrent.grace_delay,
            ..Self::new(config.metainfo.cache_dir.clone())
        }
    }

    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    pub fn with_grace_delay(mut self, grace_delay: Duration) -> Self {
        self.grace_delay = grace_delay;
        self
    }

    pub fn with_on_new_torrent(
        mut self,
        hook: impl Fn(&Arc<Torrent>, Option<&MetaInfo>) + Send + Sync + 'static,
    ) -> Self {
        self.on_new_torrent = Some(Arc::new(hook));
        self
    }

    pub fn with_on_torrent_grace(
        mut self,
        hook: impl Fn(&Arc<Torrent>) + Send + Sync + 'static,
    ) -> Self {
        self.on_torrent_grace = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerConfig")
            .field("cache_dir", &self.cache_dir)
            .field("blob_store", &self.blob_store.is_some())
            .field("temp_file_suffix", &self.temp_file_suffix)
            .field("grace_delay", &self.grace_delay)
            .field("on_new_torrent", &self.on_new_torrent.is_some())
            .field("on_torrent_grace", &self.on_torrent_grace.is_some())
            .finish()
    }
}

/// Shared state behind the torrent middleware.
///
/// Holds the torrent client, the reference registry keeping torrents alive
/// across overlapping requests, and the metainfo store.
pub struct Handler {
    client: Arc<dyn TorrentClient>,
    refs: RefRegistry<InfoHash>,
    store: MetainfoStore,
    grace_delay: Duration,
    on_new_torrent: Option<OnNewTorrent>,
    on_torrent_grace: Option<OnTorrentGrace>,
}

/// Result of [`Handler::acquire_torrent`].
#[derive(Debug)]
pub struct AcquiredTorrent {
    pub torrent: Arc<Torrent>,
    /// True only for the acquisition that made the client add the torrent.
    pub is_new: bool,
    pub lease: Arc<TorrentLease>,
}

impl Handler {
    pub fn new(client: Arc<dyn TorrentClient>, config: HandlerConfig) -> Self {
        let backend = match config.blob_store {
            Some(store) => MetainfoBackend::Blob(store),
            None => MetainfoBackend::Filesystem,
        };

        let metainfo = MetainfoConfig {
            cache_dir: config.cache_dir,
            temp_file_suffix: config.temp_file_suffix,
        };

        Self {
            client,
            refs: RefRegistry::new(),
            store: MetainfoStore::from_config(&metainfo, backend),
            grace_delay: config.grace_delay,
            on_new_torrent: config.on_new_torrent,
            on_torrent_grace: config.on_torrent_grace,
        }
    }

    pub fn client(&self) -> &Arc<dyn TorrentClient> {
        &self.client
    }

    pub fn refs(&self) -> &RefRegistry<InfoHash> {
        &self.refs
    }

    pub fn store(&self) -> &MetainfoStore {
        &self.store
    }

    pub fn grace_delay(&self) -> Duration {
        self.grace_delay
    }

    /// Takes a reference on `info_hash` and gets or adds its torrent.
    ///
    /// The reference is held by the returned lease. When the last reference
    /// for the info hash is released, the grace hook runs with the torrent.
    ///
    /// # Errors
    ///
    /// - `TorrentError::EngineShutdown` - Torrent client is no longer running
    pub async fn acquire_torrent(
        &self,
        info_hash: InfoHash,
    ) -> Result<AcquiredTorrent, TorrentError> {
        let torrent_ref = self.refs.new_ref(info_hash);
        let (torrent, is_new) = self.client.add_torrent_info_hash(info_hash).await?;

        let closer_torrent = Arc::clone(&torrent);
        let on_grace = self.on_torrent_grace.clone();
        torrent_ref.set_closer(move || {
            tracing::debug!(info_hash = %closer_torrent.info_hash(), "Torrent reference closed");
            if let Some(hook) = on_grace {
                hook(&closer_torrent);
            }
        });

        Ok(AcquiredTorrent {
            torrent,
            is_new,
            lease: Arc::new(TorrentLease::new(torrent_ref, self.grace_delay)),
        })
    }

    /// Hydrates a torrent the client has just added and starts persisting it.
    ///
    /// Cache read failures are logged and treated as a miss.
    pub async fn hydrate_new_torrent(&self, torrent: &Arc<Torrent>) {
        let info_hash = torrent.info_hash();
        let cached = match self.store.lookup(info_hash).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(%info_hash, error = %e, "Error getting cached metainfo");
                None
            }
        };

        if let Some(hook) = &self.on_new_torrent {
            hook(torrent, cached.as_ref());
        } else if let Some(metainfo) = &cached {
            install_metainfo(torrent, metainfo);
        }

        let store = self.store.clone();
        let torrent = Arc::clone(torrent);
        tokio::spawn(async move { store.save_when_available(torrent).await });
    }

    /// Saves the torrent's metainfo if it is known. Errors are logged.
    pub async fn save_torrent(&self, torrent: &Torrent) {
        if let Err(e) = self.store.save(torrent).await {
            tracing::error!(info_hash = %torrent.info_hash(), error = %e, "Error saving metainfo");
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("store", &self.store)
            .field("grace_delay", &self.grace_delay)
            .field("live_refs", &self.refs.len())
            .finish_non_exhaustive()
    }
}

fn install_metainfo(torrent: &Torrent, metainfo: &MetaInfo) {
    if let Err(e) = torrent.set_info_bytes(metainfo.info_bytes().clone()) {
        tracing::warn!(info_hash = %torrent.info_hash(), error = %e, "Cached metainfo rejected");
        return;
    }
    torrent.merge_spec(&metainfo.torrent_spec());
}

/// Holds a torrent reference for as long as a request needs it.
///
/// Shared through `Arc` so a response body can outlive the handler. When the
/// last clone is dropped the reference is released after the grace delay, or
/// immediately if the delay is zero or no runtime is available.
pub struct TorrentLease {
    torrent_ref: Option<Ref<InfoHash>>,
    grace_delay: Duration,
}

impl TorrentLease {
    fn new(torrent_ref: Ref<InfoHash>, grace_delay: Duration) -> Self {
        Self {
            torrent_ref: Some(torrent_ref),
            grace_delay,
        }
    }

    pub fn info_hash(&self) -> Option<InfoHash> {
        self.torrent_ref.as_ref().map(|r| *r.key())
    }
}

impl fmt::Debug for TorrentLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TorrentLease")
            .field("info_hash", &self.info_hash())
            .field("grace_delay", &self.grace_delay)
            .finish()
    }
}

impl Drop for TorrentLease {
    fn drop(&mut self) {
        let Some(torrent_ref) = self.torrent_ref.take() else {
            return;
        };

        if self.grace_delay.is_zero() {
            torrent_ref.release();
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let grace_delay = self.grace_delay;
                // If the runtime shuts down first, dropping the task drops the ref.
                runtime.spawn(async move {
                    tokio::time::sleep(grace_delay).await;
                    torrent_ref.release();
                });
            }
            Err(_) => torrent_ref.release(),
        }
    }
}

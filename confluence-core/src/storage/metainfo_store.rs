//! Metainfo cache lookup and persistence.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::fs;

use super::{BlobStore, StorageError};
use crate::config::MetainfoConfig;
use crate::engine::Torrent;
use crate::torrent::{InfoHash, MetaInfo};

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where cached metainfo is read from and written to.
#[derive(Clone, Default)]
pub enum MetainfoBackend {
    /// Plain files on the local filesystem.
    #[default]
    Filesystem,
    /// A pluggable blob store addressed by the same path strings.
    Blob(Arc<dyn BlobStore>),
}

impl fmt::Debug for MetainfoBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetainfoBackend::Filesystem => f.write_str("Filesystem"),
            MetainfoBackend::Blob(_) => f.write_str("Blob(..)"),
        }
    }
}

/// Reads and writes `<cache_dir>/<infohash>.torrent` entries.
#[derive(Debug, Clone)]
pub struct MetainfoStore {
    cache_dir: PathBuf,
    backend: MetainfoBackend,
    temp_file_suffix: &'static str,
}

impl MetainfoStore {
    pub fn new(cache_dir: impl Into<PathBuf>, backend: MetainfoBackend) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            backend,
            temp_file_suffix: MetainfoConfig::default().temp_file_suffix,
        }
    }

    pub fn from_config(config: &MetainfoConfig, backend: MetainfoBackend) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
            backend,
            temp_file_suffix: config.temp_file_suffix,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn backend(&self) -> &MetainfoBackend {
        &self.backend
    }

    pub fn temp_file_suffix(&self) -> &'static str {
        self.temp_file_suffix
    }

    /// Storage key for `info_hash`: the cache directory and file name joined with `/`.
    pub fn key_for(&self, info_hash: InfoHash) -> String {
        let dir = self.cache_dir.to_string_lossy();
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() {
            format!("{info_hash}.torrent")
        } else {
            format!("{dir}/{info_hash}.torrent")
        }
    }

    /// Loads cached metainfo for `info_hash`.
    ///
    /// Returns `Ok(None)` when nothing is cached.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - Entry exists but could not be read
    /// - `StorageError::InvalidMetainfo` - Entry is not a valid metainfo file
    pub async fn lookup(&self, info_hash: InfoHash) -> Result<Option<MetaInfo>, StorageError> {
        let key = self.key_for(info_hash);
        let Some(data) = self.read(&key).await? else {
            return Ok(None);
        };

        let metainfo = MetaInfo::from_bytes(&data)?;
        if metainfo.info_hash() != info_hash {
            tracing::warn!(
                %info_hash,
                actual = %metainfo.info_hash(),
                key = %key,
                "Cached metainfo has a different info hash"
            );
        }
        tracing::debug!(%info_hash, key = %key, "Loaded cached metainfo");
        Ok(Some(metainfo))
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        match &self.backend {
            MetainfoBackend::Filesystem => match fs::read(key).await {
                Ok(data) => Ok(Some(Bytes::from(data))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(StorageError::io(
                    format!("opening from metainfo storage: {key}"),
                    e,
                )),
            },
            MetainfoBackend::Blob(store) => {
                let blob = match store.open(key).await {
                    Ok(blob) => blob,
                    Err(e) if e.is_not_found() => return Ok(None),
                    Err(StorageError::Io { context, source }) => {
                        return Err(StorageError::io(
                            format!("opening from metainfo storage: {context}"),
                            source,
                        ));
                    }
                    Err(e) => return Err(e),
                };
                let length = usize::try_from(blob.length()).map_err(|_| {
                    StorageError::io(
                        format!("reading from metainfo storage: {key}"),
                        std::io::Error::from(std::io::ErrorKind::FileTooLarge),
                    )
                })?;
                blob.read_at(0, length).await.map(Some)
            }
        }
    }

    /// Persists the torrent's current metainfo.
    ///
    /// Returns `Ok(false)` without writing when the torrent's info is not yet
    /// known, `Ok(true)` once written. Saving the same torrent again rewrites
    /// identical bytes.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - Write failed
    pub async fn save(&self, torrent: &Torrent) -> Result<bool, StorageError> {
        let Some(metainfo) = torrent.metainfo() else {
            return Ok(false);
        };

        let key = self.key_for(torrent.info_hash());
        let data = Bytes::from(metainfo.to_bytes());
        match &self.backend {
            MetainfoBackend::Filesystem => {
                write_atomically(Path::new(&key), &data, self.temp_file_suffix).await?
            }
            MetainfoBackend::Blob(store) => store.put(&key, data).await?,
        }

        tracing::debug!(info_hash = %torrent.info_hash(), key = %key, "Saved metainfo");
        Ok(true)
    }

    /// Waits until the torrent's info is known and saves it.
    ///
    /// Exits without writing if the torrent is closed first. Errors are
    /// logged, not returned, since this runs detached from any request.
    pub async fn save_when_available(&self, torrent: Arc<Torrent>) {
        let info_hash = torrent.info_hash();

        tokio::select! {
            biased;
            _ = torrent.got_info() => {}
            _ = torrent.closed() => {
                tracing::debug!(%info_hash, "Torrent closed before info was known");
                return;
            }
        }

        if let Err(e) = self.save(&torrent).await {
            tracing::error!(%info_hash, error = %e, "Failed to save metainfo");
        }
    }
}

async fn write_atomically(path: &Path, data: &[u8], suffix: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|e| {
            StorageError::io(format!("creating directory {}", parent.display()), e)
        })?;
    }

    // Unique per write so concurrent saves of one torrent never share a temp file.
    let sequence = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(format!(".{}.{sequence}{suffix}", std::process::id()));
    let temp_path = PathBuf::from(temp_path);

    if let Err(e) = fs::write(&temp_path, data).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StorageError::io(
            format!("writing {}", temp_path.display()),
            e,
        ));
    }

    fs::rename(&temp_path, path).await.map_err(|e| {
        StorageError::io(
            format!("renaming {} to {}", temp_path.display(), path.display()),
            e,
        )
    })
}

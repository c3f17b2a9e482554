//! Torrent identity, metainfo parsing and reference tracking

pub mod parsing;
pub mod refs;

use std::fmt;
use std::str::FromStr;

pub use parsing::{MagnetLink, MetaInfo, TorrentSpec, info_hash_of};
pub use refs::{Ref, RefRegistry};

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary from a torrent file.
/// Used to uniquely identify torrents across the BitTorrent network.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Length of the hash in bytes.
    pub const LEN: usize = 20;

    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parses a 40-character hexadecimal info hash.
    ///
    /// # Errors
    /// - `TorrentError::InvalidInfoHash` - Wrong length or non-hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self, TorrentError> {
        if hex_str.len() != 2 * Self::LEN {
            return Err(TorrentError::InvalidInfoHash {
                reason: format!("hash hex string has bad length: {}", hex_str.len()),
            });
        }

        let mut hash = [0u8; 20];
        hex::decode_to_slice(hex_str, &mut hash).map_err(|e| TorrentError::InvalidInfoHash {
            reason: e.to_string(),
        })?;
        Ok(Self(hash))
    }

    /// Builds an info hash from a byte slice that must be exactly 20 bytes long.
    ///
    /// # Errors
    /// - `TorrentError::InvalidInfoHash` - Slice is not 20 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TorrentError> {
        let hash: [u8; 20] = bytes.try_into().map_err(|_| TorrentError::InvalidInfoHash {
            reason: format!("expected {} bytes, got {}", Self::LEN, bytes.len()),
        })?;
        Ok(Self(hash))
    }

    /// Lowercase hexadecimal form, as used in cache file names.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({self})")
    }
}

impl FromStr for InfoHash {
    type Err = TorrentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Errors that can occur during torrent operations.
#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    #[error("invalid info hash: {reason}")]
    InvalidInfoHash { reason: String },

    #[error("invalid magnet link: {reason}")]
    InvalidMagnetLink { reason: String },

    #[error("Failed to parse torrent file: {reason}")]
    InvalidTorrentFile { reason: String },

    #[error("info bytes hash to {actual}, expected {expected}")]
    InfoHashMismatch {
        expected: InfoHash,
        actual: InfoHash,
    },

    #[error("Torrent {info_hash} not found")]
    TorrentNotFound { info_hash: InfoHash },

    #[error("Torrent engine has shut down")]
    EngineShutdown,

    #[error("Torrent engine command queue is full")]
    EngineBusy,
}

//! Core types produced by metainfo and magnet parsing

use bytes::Bytes;
use sha1::{Digest, Sha1};

use super::bencode::BencodeParser;
use super::magnet::MagnetParser;
use crate::torrent::{InfoHash, TorrentError};

/// Decoded metainfo file.
///
/// The `info` dictionary is kept as the exact bytes it was read from, so the
/// info hash is stable however the surrounding fields are re-encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaInfo {
    info_bytes: Bytes,
    info_hash: InfoHash,
    pub announce: Option<String>,
    pub announce_list: Vec<Vec<String>>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    pub creation_date: Option<i64>,
    pub url_list: Vec<String>,
}

impl MetaInfo {
    /// Parses a bencoded metainfo file.
    ///
    /// # Errors
    /// - `TorrentError::InvalidTorrentFile` - Malformed bencode or missing `info`
    pub fn from_bytes(data: &[u8]) -> Result<Self, TorrentError> {
        BencodeParser::parse_metainfo(data)
    }

    /// Builds a metainfo with no top-level fields other than `info`.
    ///
    /// # Errors
    /// - `TorrentError::InvalidTorrentFile` - Bytes are not a single bencoded dictionary
    pub fn from_info_bytes(info_bytes: impl Into<Bytes>) -> Result<Self, TorrentError> {
        let info_bytes = info_bytes.into();
        BencodeParser::validate_info_dictionary(&info_bytes)?;
        Ok(Self::from_parts(info_bytes))
    }

    pub(super) fn from_parts(info_bytes: Bytes) -> Self {
        Self {
            info_hash: info_hash_of(&info_bytes),
            info_bytes,
            announce: None,
            announce_list: Vec::new(),
            comment: None,
            created_by: None,
            creation_date: None,
            url_list: Vec::new(),
        }
    }

    /// SHA-1 of the info dictionary bytes.
    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Exact bencoded `info` dictionary.
    pub fn info_bytes(&self) -> &Bytes {
        &self.info_bytes
    }

    /// Display name from the info dictionary, if present and valid UTF-8.
    pub fn name(&self) -> Option<String> {
        BencodeParser::info_name(&self.info_bytes)
    }

    /// Tracker tiers: `announce-list` when present, otherwise `announce` as one tier.
    pub fn trackers(&self) -> Vec<Vec<String>> {
        if !self.announce_list.is_empty() {
            return self.announce_list.clone();
        }
        match &self.announce {
            Some(announce) if !announce.is_empty() => vec![vec![announce.clone()]],
            _ => Vec::new(),
        }
    }

    /// What this metainfo contributes to a live torrent besides its info bytes.
    pub fn torrent_spec(&self) -> TorrentSpec {
        TorrentSpec {
            info_hash: self.info_hash,
            display_name: self.name(),
            trackers: self.trackers(),
            web_seeds: self.url_list.clone(),
        }
    }

    /// Encodes the metainfo as a bencoded `.torrent` file.
    pub fn to_bytes(&self) -> Vec<u8> {
        BencodeParser::encode_metainfo(self)
    }
}

/// Torrent attributes that can be merged into an existing torrent handle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TorrentSpec {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<Vec<String>>,
    pub web_seeds: Vec<String>,
}

/// Magnet link components.
///
/// Parsed magnet URI containing minimal torrent metadata.
/// Contains info hash and optional display name and tracker URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

impl MagnetLink {
    /// Parses a `magnet:?xt=urn:btih:...` URI.
    ///
    /// # Errors
    /// - `TorrentError::InvalidMagnetLink` - Malformed URI or unusable `xt`
    pub fn parse(uri: &str) -> Result<Self, TorrentError> {
        MagnetParser::parse_magnet_link(uri)
    }
}

/// Computes the info hash of raw info dictionary bytes.
pub fn info_hash_of(info_bytes: &[u8]) -> InfoHash {
    let digest = Sha1::digest(info_bytes);
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&digest);
    InfoHash::new(hash)
}

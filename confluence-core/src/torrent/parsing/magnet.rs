//! Magnet link parsing utilities

use data_encoding::BASE32;
use url::Url;

use super::types::MagnetLink;
use crate::torrent::{InfoHash, TorrentError};

const BTIH_PREFIX: &str = "urn:btih:";

/// Magnet link parsing utilities.
pub struct MagnetParser;

impl MagnetParser {
    /// Parses magnet link to extract torrent information.
    ///
    /// The first `urn:btih:` exact topic gives the info hash; other topic
    /// kinds are skipped. Trackers keep their order of appearance and all
    /// values are percent-decoded.
    ///
    /// # Errors
    /// - `TorrentError::InvalidMagnetLink` - Malformed magnet URI, badly
    ///   encoded btih, or no btih topic at all
    pub fn parse_magnet_link(magnet_url: &str) -> Result<MagnetLink, TorrentError> {
        let url = Url::parse(magnet_url).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "magnet" {
            return Err(invalid(format!(
                "unexpected scheme {:?}, expected \"magnet\"",
                url.scheme()
            )));
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" if info_hash.is_none() => {
                    if let Some(encoded) = value.strip_prefix(BTIH_PREFIX) {
                        info_hash = Some(Self::decode_btih(encoded)?);
                    }
                }
                "dn" => display_name = Some(value.into_owned()),
                "tr" => trackers.push(value.into_owned()),
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or_else(|| invalid("missing xt parameter"))?;

        Ok(MagnetLink {
            info_hash,
            display_name,
            trackers,
        })
    }

    /// Decodes the hash part of `xt=urn:btih:<hash>`.
    ///
    /// Accepts 40-character hex and 32-character base32 encodings.
    fn decode_btih(encoded: &str) -> Result<InfoHash, TorrentError> {
        match encoded.len() {
            40 => InfoHash::from_hex(encoded).map_err(|e| invalid(e.to_string())),
            32 => {
                let decoded = BASE32
                    .decode(encoded.to_ascii_uppercase().as_bytes())
                    .map_err(|e| invalid(format!("decoding base32 info hash: {e}")))?;
                InfoHash::from_slice(&decoded).map_err(|e| invalid(e.to_string()))
            }
            len => Err(invalid(format!(
                "unhandled xt parameter encoding: encoded length {len}"
            ))),
        }
    }
}

fn invalid(reason: impl Into<String>) -> TorrentError {
    TorrentError::InvalidMagnetLink {
        reason: reason.into(),
    }
}

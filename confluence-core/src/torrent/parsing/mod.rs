//! Metainfo and magnet link parsing.
//!
//! Metainfo decoding uses bencode-rs for structure and a span scanner to keep
//! the exact `info` dictionary bytes, so the info hash survives a round trip.
//! Magnet URIs are parsed with the url crate.

pub mod bencode;
pub mod magnet;
pub mod types;

// Re-export public API
pub use bencode::BencodeParser;
pub use types::{MagnetLink, MetaInfo, TorrentSpec, info_hash_of};

//! Metainfo fixtures shared by unit and integration tests.

use crate::torrent::MetaInfo;

/// Tracker announced by [`sample_metainfo`].
pub const SAMPLE_TRACKER: &str = "http://tracker.example.com/announce";

/// Builds a small, valid single-file info dictionary named `name`.
///
/// Different names give different info hashes.
pub fn sample_info_bytes(name: &str) -> Vec<u8> {
    let mut info = Vec::new();
    info.extend_from_slice(b"d6:lengthi1024e4:name");
    info.extend_from_slice(format!("{}:", name.len()).as_bytes());
    info.extend_from_slice(name.as_bytes());
    info.extend_from_slice(b"12:piece lengthi16384e6:pieces20:");
    info.extend_from_slice(&[0xaa; 20]);
    info.push(b'e');
    info
}

/// Builds metainfo for [`sample_info_bytes`] with one tracker tier.
///
/// # Panics
///
/// Panics if the generated info dictionary is rejected, which indicates a broken fixture.
pub fn sample_metainfo(name: &str) -> MetaInfo {
    let mut metainfo = MetaInfo::from_info_bytes(sample_info_bytes(name)).unwrap();
    metainfo.announce = Some(SAMPLE_TRACKER.to_string());
    metainfo.announce_list = vec![vec![SAMPLE_TRACKER.to_string()]];
    metainfo
}

//! Inner route handlers run behind the torrent middleware

pub mod torrent;

pub use torrent::{TorrentStatus, torrent_info, torrent_metainfo, torrent_status};

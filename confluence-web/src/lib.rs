//! Confluence Web - torrent-aware HTTP middleware

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! Resolves the torrent a request refers to, keeps it referenced for the
//! lifetime of the request plus a grace delay, hydrates first-seen torrents
//! from cached metainfo and persists metainfo once the client learns it.

pub mod handler;
pub mod middleware;
pub mod routes;
pub mod server;

// Re-export main types
pub use handler::{AcquiredTorrent, Handler, HandlerConfig, TorrentLease};
pub use middleware::{ResolveError, TorrentRequest, resolve_info_hash, with_torrent_context};
pub use server::{build_router, run_server};

//! Middleware attaching a held torrent to each request.
//!
//! Resolves the requested info hash from the `magnet` or `ih` query parameter
//! or an `/<route>/infohash/<hex>` path, holds a reference on the torrent for
//! the lifetime of the request and hydrates torrents seen for the first time.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{StatusCode, Uri, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use confluence_core::engine::Torrent;
use confluence_core::torrent::{InfoHash, MagnetLink, TorrentError};

use crate::handler::{Handler, TorrentLease};

const MAGNET_QUERY_KEY: &str = "magnet";
const INFOHASH_QUERY_KEY: &str = "ih";

/// Why the requested info hash could not be determined.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("parsing magnet: {0}")]
    Magnet(#[source] TorrentError),

    #[error("{0}")]
    InfoHash(#[source] TorrentError),

    #[error("expected nonempty query parameter \"magnet\" or \"ih\"")]
    Missing,
}

impl IntoResponse for ResolveError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("error determining requested infohash: {self}"),
        )
            .into_response()
    }
}

/// Info hash a request refers to, plus trackers from its magnet link if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub info_hash: InfoHash,
    /// Added to the torrent as one tier on every request.
    pub magnet_trackers: Option<Vec<String>>,
}

/// Determines the info hash a request refers to.
///
/// A non-empty `magnet` query parameter wins over `ih`, which wins over a
/// path of the form `/<route>/infohash/<hex>[/...]`.
///
/// # Errors
///
/// - `ResolveError::Magnet` - `magnet` parameter is not a usable magnet link
/// - `ResolveError::InfoHash` - Hex info hash does not decode to 20 bytes
/// - `ResolveError::Missing` - No info hash in query or path
pub fn resolve_info_hash(uri: &Uri) -> Result<ResolvedTarget, ResolveError> {
    let magnet = query_value(uri, MAGNET_QUERY_KEY);
    if !magnet.is_empty() {
        let link = MagnetLink::parse(&magnet).map_err(ResolveError::Magnet)?;
        return Ok(ResolvedTarget {
            info_hash: link.info_hash,
            magnet_trackers: Some(link.trackers),
        });
    }

    let mut hex = query_value(uri, INFOHASH_QUERY_KEY);
    if hex.is_empty() {
        let path = decoded_path(uri);
        //   /<route>/infohash/<hex>/...
        // [0]  [1]     [2]     [3]   [4]
        let parts: Vec<&str> = path.splitn(5, '/').collect();
        if parts.len() >= 4 && parts[2] == "infohash" {
            hex = parts[3].to_string();
        }
    }
    if hex.is_empty() {
        return Err(ResolveError::Missing);
    }

    let info_hash = InfoHash::from_hex(&hex).map_err(ResolveError::InfoHash)?;
    Ok(ResolvedTarget {
        info_hash,
        magnet_trackers: None,
    })
}

/// Percent-decoded request path. Invalid UTF-8 is replaced, not rejected.
fn decoded_path(uri: &Uri) -> String {
    let decoded = urlencoding::decode_binary(uri.path().as_bytes());
    String::from_utf8_lossy(&decoded).into_owned()
}

/// First value of query parameter `key`, or empty.
fn query_value(uri: &Uri, key: &str) -> String {
    uri.query()
        .and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_default()
}

/// Torrent attached to a request by [`with_torrent_context`].
///
/// Inner handlers read it with `Extension<TorrentRequest>`. Cloning the
/// request (or its lease) into a response body keeps the torrent held until
/// the body is dropped.
#[derive(Debug, Clone)]
pub struct TorrentRequest {
    pub torrent: Arc<Torrent>,
    pub is_new: bool,
    pub lease: Arc<TorrentLease>,
    pub handler: Arc<Handler>,
    pub original_uri: Uri,
}

impl TorrentRequest {
    pub fn info_hash(&self) -> InfoHash {
        self.torrent.info_hash()
    }
}

/// Resolves, acquires and hydrates the requested torrent, then runs the inner handler.
///
/// Install with `axum::middleware::from_fn_with_state(handler, with_torrent_context)`.
pub async fn with_torrent_context(
    State(handler): State<Arc<Handler>>,
    mut request: Request,
    next: Next,
) -> Response {
    let target = match resolve_info_hash(request.uri()) {
        Ok(target) => target,
        Err(e) => {
            tracing::debug!(uri = %request.uri(), error = %e, "Rejected request");
            return e.into_response();
        }
    };

    let acquired = match handler.acquire_torrent(target.info_hash).await {
        Ok(acquired) => acquired,
        Err(e) => {
            tracing::error!(info_hash = %target.info_hash, error = %e, "Failed to acquire torrent");
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };
    // Held until the response is produced, and longer if the handler keeps a clone.
    let lease = acquired.lease;
    let torrent = acquired.torrent;

    if acquired.is_new {
        handler.hydrate_new_torrent(&torrent).await;
    }
    if let Some(trackers) = target.magnet_trackers {
        torrent.add_trackers(&[trackers]);
    }
    handler.save_torrent(&torrent).await;

    let torrent_request = TorrentRequest {
        torrent,
        is_new: acquired.is_new,
        lease: Arc::clone(&lease),
        handler: Arc::clone(&handler),
        original_uri: request.uri().clone(),
    };
    request.extensions_mut().insert(torrent_request);

    let response = next.run(request).await;
    drop(lease);
    response
}

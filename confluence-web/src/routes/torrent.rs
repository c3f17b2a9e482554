//! Handlers exposing the state of the requested torrent

use axum::Extension;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::middleware::TorrentRequest;

const BITTORRENT_CONTENT_TYPE: &str = "application/x-bittorrent";

#[derive(Debug, Serialize)]
pub struct TorrentStatus {
    pub info_hash: String,
    pub name: Option<String>,
    pub has_info: bool,
    pub is_new: bool,
    pub trackers: Vec<Vec<String>>,
    pub web_seeds: Vec<String>,
    pub refs: usize,
}

pub async fn torrent_status(Extension(request): Extension<TorrentRequest>) -> Json<TorrentStatus> {
    let torrent = &request.torrent;
    Json(TorrentStatus {
        info_hash: torrent.info_hash().to_hex(),
        name: torrent.name(),
        has_info: torrent.has_info(),
        is_new: request.is_new,
        trackers: torrent.trackers(),
        web_seeds: torrent.web_seeds(),
        refs: request.handler.refs().ref_count(&torrent.info_hash()),
    })
}

/// Serves the torrent's metainfo file once its info is known.
pub async fn torrent_metainfo(Extension(request): Extension<TorrentRequest>) -> Response {
    let Some(metainfo) = request.torrent.metainfo() else {
        return info_not_known();
    };

    let file_name = format!("{}.torrent", request.info_hash());
    (
        [
            (header::CONTENT_TYPE, BITTORRENT_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        metainfo.to_bytes(),
    )
        .into_response()
}

/// Serves the raw bencoded info dictionary once known.
pub async fn torrent_info(Extension(request): Extension<TorrentRequest>) -> Response {
    match request.torrent.info_bytes() {
        Some(info_bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            info_bytes,
        )
            .into_response(),
        None => info_not_known(),
    }
}

fn info_not_known() -> Response {
    (StatusCode::NOT_FOUND, "torrent info not yet known").into_response()
}

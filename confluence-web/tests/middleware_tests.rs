//! End-to-end tests for the torrent middleware

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::{Extension, State};
use axum::http::{Request, StatusCode, header};
use axum::routing::get;
use bytes::Bytes;
use confluence_core::config::ConfluenceConfig;
use confluence_core::engine::{TorrentEngineHandle, spawn_torrent_engine};
use confluence_core::storage::test_fixtures::{SAMPLE_TRACKER, sample_metainfo};
use confluence_core::storage::{Blob, BlobStore, InMemoryBlobStore, StorageError};
use confluence_core::torrent::{InfoHash, MetaInfo};
use confluence_web::{Handler, HandlerConfig, TorrentRequest, with_torrent_context};
use tokio::sync::{mpsc, watch};
use tower::ServiceExt;

const HEX: &str = "0123456789abcdef0123456789abcdef01234567";

/// Blob store that counts lookups, one per hydration.
#[derive(Clone, Default)]
struct CountingBlobStore {
    inner: InMemoryBlobStore,
    opens: Arc<AtomicUsize>,
}

#[async_trait]
impl BlobStore for CountingBlobStore {
    async fn open(&self, path: &str) -> Result<Arc<dyn Blob>, StorageError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open(path).await
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
        self.inner.put(path, data).await
    }
}

#[derive(Debug, Clone)]
struct Observation {
    info_hash: InfoHash,
    is_new: bool,
    has_info: bool,
    trackers: Vec<Vec<String>>,
}

#[derive(Clone)]
struct Probe {
    entered: mpsc::UnboundedSender<Observation>,
    gate: watch::Receiver<bool>,
}

async fn probe(
    State(probe): State<Probe>,
    Extension(request): Extension<TorrentRequest>,
) -> StatusCode {
    let _ = probe.entered.send(Observation {
        info_hash: request.info_hash(),
        is_new: request.is_new,
        has_info: request.torrent.has_info(),
        trackers: request.torrent.trackers(),
    });
    let mut gate = probe.gate.clone();
    let _ = gate.wait_for(|open| *open).await;
    StatusCode::OK
}

struct TestApp {
    router: Router,
    handler: Arc<Handler>,
    engine: TorrentEngineHandle,
    blobs: CountingBlobStore,
    observations: mpsc::UnboundedReceiver<Observation>,
    gate: watch::Sender<bool>,
}

impl TestApp {
    fn new(configure: impl FnOnce(HandlerConfig, &TorrentEngineHandle) -> HandlerConfig) -> Self {
        let engine = spawn_torrent_engine(&ConfluenceConfig::default());
        let blobs = CountingBlobStore::default();
        let config = configure(
            HandlerConfig::new("metainfo").with_blob_store(Arc::new(blobs.clone())),
            &engine,
        );
        let handler = Arc::new(Handler::new(Arc::new(engine.clone()), config));

        let (entered, observations) = mpsc::unbounded_channel();
        let (gate, gate_rx) = watch::channel(true);
        let router = Router::new()
            .route("/x", get(probe))
            .route("/y/infohash/{info_hash}/{*rest}", get(probe))
            .route_layer(axum::middleware::from_fn_with_state(
                Arc::clone(&handler),
                with_torrent_context,
            ))
            .with_state(Probe {
                entered,
                gate: gate_rx,
            });

        Self {
            router,
            handler,
            engine,
            blobs,
            observations,
            gate,
        }
    }

    fn simple() -> Self {
        Self::new(|config, _| config)
    }

    fn send(&self, uri: &str) -> impl Future<Output = (StatusCode, String)> + Send + 'static + use<> {
        let router = self.router.clone();
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        async move {
            let response = router.oneshot(request).await.unwrap();
            let status = response.status();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, String::from_utf8_lossy(&body).into_owned())
        }
    }

    fn cache_metainfo(&self, metainfo: &MetaInfo) {
        self.blobs.inner.insert(
            format!("metainfo/{}.torrent", metainfo.info_hash()),
            metainfo.to_bytes(),
        );
    }

    fn cached(&self, info_hash: InfoHash) -> Option<Bytes> {
        self.blobs.inner.get(&format!("metainfo/{info_hash}.torrent"))
    }
}

fn magnet_query(magnet: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(magnet.as_bytes()).collect();
    format!("/x?magnet={encoded}")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_magnet_first_sight_cache_miss() {
    let mut app = TestApp::simple();
    let magnet = format!("magnet:?xt=urn:btih:{HEX}&tr=http://t.example/ann");

    let (status, _) = app.send(&magnet_query(&magnet)).await;
    assert_eq!(status, StatusCode::OK);

    let seen = app.observations.recv().await.unwrap();
    assert_eq!(seen.info_hash.to_hex(), HEX);
    assert!(seen.is_new);
    assert!(!seen.has_info);
    assert!(seen.trackers.iter().flatten().any(|t| t == "http://t.example/ann"));

    // Nothing to persist until info is known.
    assert!(app.blobs.inner.is_empty());
    assert_eq!(app.blobs.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_background_save_after_info_arrives() {
    let app = TestApp::simple();
    let metainfo = sample_metainfo("later.mkv");
    let info_hash = metainfo.info_hash();

    let (status, _) = app.send(&format!("/x?ih={info_hash}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.cached(info_hash).is_none());

    let torrent = app.engine.torrent(info_hash).await.unwrap().unwrap();
    torrent
        .set_info_bytes(metainfo.info_bytes().clone())
        .unwrap();

    wait_until(|| app.cached(info_hash).is_some()).await;
    let saved = MetaInfo::from_bytes(&app.cached(info_hash).unwrap()).unwrap();
    assert_eq!(saved.info_bytes(), metainfo.info_bytes());
}

#[tokio::test]
async fn test_ih_query_cache_hit() {
    let mut app = TestApp::simple();
    let metainfo = sample_metainfo("cached.mkv");
    app.cache_metainfo(&metainfo);

    let (status, _) = app.send(&format!("/x?ih={}", metainfo.info_hash())).await;
    assert_eq!(status, StatusCode::OK);

    let seen = app.observations.recv().await.unwrap();
    assert!(seen.is_new);
    assert!(seen.has_info);
    assert_eq!(seen.trackers, vec![vec![SAMPLE_TRACKER.to_string()]]);

    let torrent = app
        .engine
        .torrent(metainfo.info_hash())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(torrent.info_bytes().as_ref(), Some(metainfo.info_bytes()));
}

#[tokio::test(start_paused = true)]
async fn test_path_request_joins_in_flight_request() {
    let grace = Duration::from_secs(5);
    let mut app = TestApp::new(|config, _| config.with_grace_delay(grace));
    let metainfo = sample_metainfo("shared.mkv");
    let info_hash = metainfo.info_hash();
    app.cache_metainfo(&metainfo);
    app.gate.send_replace(false);

    let first = tokio::spawn(app.send(&format!("/x?ih={info_hash}")));
    let first_seen = app.observations.recv().await.unwrap();
    let second = tokio::spawn(app.send(&format!("/y/infohash/{info_hash}/foo")));
    let second_seen = app.observations.recv().await.unwrap();

    assert!(first_seen.is_new);
    assert!(!second_seen.is_new);
    assert!(second_seen.has_info);
    assert_eq!(app.blobs.opens.load(Ordering::SeqCst), 1);
    assert_eq!(app.handler.refs().ref_count(&info_hash), 2);

    app.gate.send_replace(true);
    assert_eq!(first.await.unwrap().0, StatusCode::OK);
    assert_eq!(second.await.unwrap().0, StatusCode::OK);

    // Both releases are scheduled, neither has fired yet.
    assert_eq!(app.handler.refs().ref_count(&info_hash), 2);
    tokio::time::sleep(grace + Duration::from_millis(1)).await;
    assert!(!app.handler.refs().contains(&info_hash));
}

#[tokio::test]
async fn test_missing_identifier_is_bad_request() {
    let app = TestApp::simple();
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/x").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8_lossy(&body);
    assert!(body.starts_with(
        "error determining requested infohash: expected nonempty query parameter"
    ));
    assert!(app.handler.refs().is_empty());
}

#[tokio::test]
async fn test_malformed_magnet_is_bad_request() {
    let app = TestApp::simple();
    let (status, body) = app.send("/x?magnet=not-a-magnet").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with("error determining requested infohash: "));
    assert!(body.contains("parsing magnet:"));
    assert!(app.engine.active_torrents().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_short_hex_is_bad_request() {
    let app = TestApp::simple();
    let (status, body) = app.send("/x?ih=deadbeef").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with("error determining requested infohash: "));
    assert!(app.handler.refs().is_empty());
}

#[tokio::test]
async fn test_magnet_trackers_added_on_every_request() {
    let mut app = TestApp::simple();

    app.send(&magnet_query(&format!(
        "magnet:?xt=urn:btih:{HEX}&tr=http://a.example/ann"
    )))
    .await;
    app.send(&magnet_query(&format!(
        "magnet:?xt=urn:btih:{HEX}&tr=http://b.example/ann"
    )))
    .await;

    let first = app.observations.recv().await.unwrap();
    let second = app.observations.recv().await.unwrap();
    assert!(first.is_new);
    assert!(!second.is_new);
    assert_eq!(
        second.trackers,
        vec![vec![
            "http://a.example/ann".to_string(),
            "http://b.example/ann".to_string(),
        ]]
    );
}

#[tokio::test]
async fn test_concurrent_first_requests_see_one_new() {
    let mut app = TestApp::simple();
    let requests: Vec<_> = (0..16).map(|_| app.send(&format!("/x?ih={HEX}"))).collect();

    let results = futures::future::join_all(requests).await;
    assert!(results.iter().all(|(status, _)| *status == StatusCode::OK));

    let mut new_count = 0;
    for _ in 0..16 {
        if app.observations.recv().await.unwrap().is_new {
            new_count += 1;
        }
    }
    assert_eq!(new_count, 1);
    assert_eq!(app.blobs.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_eager_save_writes_before_dispatch() {
    let app = TestApp::simple();
    let metainfo = sample_metainfo("eager.mkv");
    let info_hash = metainfo.info_hash();

    app.send(&format!("/x?ih={info_hash}")).await;
    let torrent = app.engine.torrent(info_hash).await.unwrap().unwrap();
    torrent
        .set_info_bytes(metainfo.info_bytes().clone())
        .unwrap();
    torrent.add_trackers(&[vec![SAMPLE_TRACKER.to_string()]]);

    app.send(&format!("/x?ih={info_hash}")).await;
    let saved = MetaInfo::from_bytes(&app.cached(info_hash).unwrap()).unwrap();
    assert_eq!(saved.info_bytes(), metainfo.info_bytes());
    assert_eq!(saved.trackers(), torrent.trackers());
}

#[tokio::test]
async fn test_cancelled_request_still_releases() {
    let mut app = TestApp::simple();
    app.gate.send_replace(false);

    let request = tokio::spawn(app.send(&format!("/x?ih={HEX}")));
    app.observations.recv().await.unwrap();
    let info_hash: InfoHash = HEX.parse().unwrap();
    assert!(app.handler.refs().contains(&info_hash));

    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());
    assert!(!app.handler.refs().contains(&info_hash));
}

#[tokio::test]
async fn test_grace_hook_can_drop_torrent() {
    let grace_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&grace_calls);
    let mut app = TestApp::new(move |config, engine| {
        let engine = engine.clone();
        config.with_on_torrent_grace(move |torrent| {
            calls.fetch_add(1, Ordering::SeqCst);
            engine.queue_drop_torrent(torrent.info_hash()).unwrap();
        })
    });

    app.send(&format!("/x?ih={HEX}")).await;
    assert!(app.observations.recv().await.unwrap().is_new);
    assert_eq!(grace_calls.load(Ordering::SeqCst), 1);

    // The queued drop is handled before the next add.
    app.send(&format!("/x?ih={HEX}")).await;
    assert!(app.observations.recv().await.unwrap().is_new);
}

#[tokio::test]
async fn test_new_torrent_hook_receives_cached_metainfo() {
    let hooked = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&hooked);
    let mut app = TestApp::new(move |config, _| {
        config.with_on_new_torrent(move |torrent, cached| {
            calls.fetch_add(1, Ordering::SeqCst);
            if let Some(metainfo) = cached {
                torrent
                    .set_info_bytes(metainfo.info_bytes().clone())
                    .unwrap();
            }
        })
    });
    let metainfo = sample_metainfo("hooked.mkv");
    app.cache_metainfo(&metainfo);

    app.send(&format!("/x?ih={}", metainfo.info_hash())).await;
    app.send(&format!("/x?ih={}", metainfo.info_hash())).await;

    let first = app.observations.recv().await.unwrap();
    assert!(first.has_info);
    // The hook installed info only; trackers from the cache were not merged.
    assert!(first.trackers.is_empty());
    assert_eq!(hooked.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_engine_shutdown_is_service_unavailable() {
    let app = TestApp::simple();
    app.engine.shutdown().await.unwrap();

    let (status, _) = app.send(&format!("/x?ih={HEX}")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(app.handler.refs().is_empty());
}

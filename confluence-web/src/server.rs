//! Router assembly and HTTP server for Confluence
//!
//! Every route runs behind [`with_torrent_context`], so each is reachable as
//! `/<route>?ih=<hex>`, `/<route>?magnet=<uri>` or `/<route>/infohash/<hex>[/...]`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{MethodRouter, get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::Handler;
use crate::middleware::with_torrent_context;
use crate::routes::{torrent_info, torrent_metainfo, torrent_status};

/// Builds the application router around `handler`.
pub fn build_router(handler: Arc<Handler>) -> Router {
    let router = Router::new();
    let router = torrent_route(router, "status", get(torrent_status));
    let router = torrent_route(router, "metainfo", get(torrent_metainfo));
    let router = torrent_route(router, "info", get(torrent_info));

    router
        .route_layer(axum::middleware::from_fn_with_state(
            handler,
            with_torrent_context,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Registers `method_router` under the query form and both path forms of `name`.
fn torrent_route(router: Router, name: &str, method_router: MethodRouter) -> Router {
    router
        .route(&format!("/{name}"), method_router.clone())
        .route(&format!("/{name}/infohash/{{info_hash}}"), method_router.clone())
        .route(&format!("/{name}/infohash/{{info_hash}}/{{*rest}}"), method_router)
}

/// Serves the router on `addr` until Ctrl-C is received.
///
/// # Errors
///
/// - `std::io::Error` - Binding or serving on `addr` failed
pub async fn run_server(addr: SocketAddr, handler: Arc<Handler>) -> std::io::Result<()> {
    let app = build_router(handler);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Confluence server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

//! CLI command implementations

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use confluence_core::config::ConfluenceConfig;
use confluence_core::engine::{TorrentEngineHandle, spawn_torrent_engine};
use confluence_core::torrent::MetaInfo;
use confluence_web::{Handler, HandlerConfig, run_server};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind to
        #[arg(long)]
        addr: Option<SocketAddr>,
        /// Directory holding cached `<infohash>.torrent` files
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Seconds to keep a torrent after its last request finishes
        #[arg(long)]
        grace_secs: Option<u64>,
    },
    /// Print the info hash, name and trackers of a metainfo file
    Inspect {
        /// Path to a `.torrent` file
        path: PathBuf,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of the command that failed
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve {
            addr,
            cache_dir,
            grace_secs,
        } => serve(server_config(addr, cache_dir, grace_secs)?).await,
        Commands::Inspect { path } => inspect(path).await,
    }
}

/// Layers command-line flags over environment configuration.
fn server_config(
    addr: Option<SocketAddr>,
    cache_dir: Option<PathBuf>,
    grace_secs: Option<u64>,
) -> anyhow::Result<ConfluenceConfig> {
    let mut config = ConfluenceConfig::from_env().context("reading environment configuration")?;
    if let Some(addr) = addr {
        config.server.bind_addr = addr;
    }
    if let Some(cache_dir) = cache_dir {
        config.metainfo.cache_dir = cache_dir;
    }
    if let Some(grace_secs) = grace_secs {
        config.torrent.grace_delay = Duration::from_secs(grace_secs);
    }
    Ok(config)
}

/// Runs the server until interrupted, then shuts the engine down.
///
/// # Errors
/// - Binding or serving on the configured address failed
pub async fn serve(config: ConfluenceConfig) -> anyhow::Result<()> {
    let engine = spawn_torrent_engine(&config);
    let handler = Arc::new(Handler::new(
        Arc::new(engine.clone()),
        handler_config(&config, engine.clone()),
    ));

    tracing::info!(
        cache_dir = %config.metainfo.cache_dir.display(),
        grace_secs = config.torrent.grace_delay.as_secs(),
        "Starting Confluence"
    );

    let served = run_server(config.server.bind_addr, handler)
        .await
        .with_context(|| format!("serving on {}", config.server.bind_addr));

    if let Err(e) = engine.shutdown().await {
        tracing::warn!(error = %e, "Torrent engine already stopped");
    }
    served
}

/// Drops torrents from the engine once no request has held them for the grace delay.
///
/// The drop is queued before the hook returns, so a request that takes a new
/// reference afterwards is answered with a fresh torrent.
fn handler_config(config: &ConfluenceConfig, engine: TorrentEngineHandle) -> HandlerConfig {
    HandlerConfig::from_config(config).with_on_torrent_grace(move |torrent| {
        let info_hash = torrent.info_hash();
        if let Err(e) = engine.queue_drop_torrent(info_hash) {
            tracing::debug!(%info_hash, error = %e, "Torrent not dropped after grace");
        }
    })
}

/// Prints a summary of a metainfo file.
///
/// # Errors
/// - File could not be read or is not valid metainfo
pub async fn inspect(path: PathBuf) -> anyhow::Result<()> {
    let data = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let metainfo = MetaInfo::from_bytes(&data)
        .with_context(|| format!("loading metainfo from {}", path.display()))?;

    println!("info hash: {}", metainfo.info_hash());
    if let Some(name) = metainfo.name() {
        println!("name:      {name}");
    }
    for (tier, trackers) in metainfo.trackers().iter().enumerate() {
        println!("tier {tier}:    {}", trackers.join(" "));
    }
    for seed in &metainfo.url_list {
        println!("web seed:  {seed}");
    }

    Ok(())
}

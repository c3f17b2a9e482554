//! Centralized configuration for Confluence.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the codebase.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::{ConfluenceError, Result};

/// Central configuration for all Confluence components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct ConfluenceConfig {
    pub server: ServerConfig,
    pub torrent: TorrentConfig,
    pub metainfo: MetainfoConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server listens on
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

/// Torrent reference lifecycle configuration.
#[derive(Debug, Clone)]
pub struct TorrentConfig {
    /// Delay between a request completing and its torrent reference being released
    pub grace_delay: Duration,
    /// Capacity of the engine actor command channel
    pub command_buffer: usize,
}

impl Default for TorrentConfig {
    fn default() -> Self {
        Self {
            grace_delay: Duration::from_secs(5),
            command_buffer: 100,
        }
    }
}

/// Metainfo cache and persistence configuration.
#[derive(Debug, Clone)]
pub struct MetainfoConfig {
    /// Directory holding `<infohash>.torrent` files
    pub cache_dir: PathBuf,
    /// Suffix used for files being written before rename
    pub temp_file_suffix: &'static str,
}

impl Default for MetainfoConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("metainfo"),
            temp_file_suffix: ".tmp",
        }
    }
}

impl ConfluenceConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unset or empty variables keep the default.
    ///
    /// # Errors
    /// - `ConfluenceError::Configuration` - A variable is set but cannot be parsed
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = env_value("CONFLUENCE_BIND_ADDR") {
            config.server.bind_addr = addr
                .parse::<SocketAddr>()
                .map_err(|e| invalid_value("CONFLUENCE_BIND_ADDR", &addr, e))?;
        }

        if let Some(grace) = env_value("CONFLUENCE_GRACE_SECS") {
            let seconds = grace
                .parse::<u64>()
                .map_err(|e| invalid_value("CONFLUENCE_GRACE_SECS", &grace, e))?;
            config.torrent.grace_delay = Duration::from_secs(seconds);
        }

        if let Some(dir) = env_value("CONFLUENCE_CACHE_DIR") {
            config.metainfo.cache_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Creates a configuration suited to tests: no grace delay and a caller-provided cache.
    pub fn for_testing(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            torrent: TorrentConfig {
                grace_delay: Duration::ZERO,
                ..Default::default()
            },
            metainfo: MetainfoConfig {
                cache_dir: cache_dir.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn invalid_value(name: &str, value: &str, error: impl std::fmt::Display) -> ConfluenceError {
    ConfluenceError::Configuration {
        reason: format!("{name}={value:?}: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = ConfluenceConfig::default();

        assert_eq!(config.torrent.grace_delay, Duration::from_secs(5));
        assert_eq!(config.metainfo.cache_dir, PathBuf::from("metainfo"));
        assert_eq!(config.metainfo.temp_file_suffix, ".tmp");
        assert_eq!(config.server.bind_addr.port(), 8080);
    }

    #[test]
    fn test_testing_preset() {
        let config = ConfluenceConfig::for_testing("/tmp/cache");
        assert_eq!(config.torrent.grace_delay, Duration::ZERO);
        assert_eq!(config.metainfo.cache_dir, PathBuf::from("/tmp/cache"));
    }

    // One test owns the process environment so parallel tests never see each other's values.
    #[test]
    fn test_env_override_and_rejection() {
        unsafe {
            std::env::set_var("CONFLUENCE_BIND_ADDR", "0.0.0.0:9999");
            std::env::set_var("CONFLUENCE_GRACE_SECS", "12");
            std::env::set_var("CONFLUENCE_CACHE_DIR", "/var/cache/confluence");
        }

        let config = ConfluenceConfig::from_env().unwrap();

        assert_eq!(config.server.bind_addr.port(), 9999);
        assert_eq!(config.torrent.grace_delay, Duration::from_secs(12));
        assert_eq!(
            config.metainfo.cache_dir,
            PathBuf::from("/var/cache/confluence")
        );

        unsafe {
            std::env::set_var("CONFLUENCE_GRACE_SECS", "soon");
        }
        let err = ConfluenceConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfluenceError::Configuration { .. }));
        assert!(err.is_user_error());
        assert!(err.to_string().contains("CONFLUENCE_GRACE_SECS=\"soon\""));

        unsafe {
            std::env::set_var("CONFLUENCE_GRACE_SECS", "");
            std::env::set_var("CONFLUENCE_BIND_ADDR", "localhost");
        }
        let err = ConfluenceConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("CONFLUENCE_BIND_ADDR"));

        // Cleanup
        unsafe {
            std::env::remove_var("CONFLUENCE_BIND_ADDR");
            std::env::remove_var("CONFLUENCE_GRACE_SECS");
            std::env::remove_var("CONFLUENCE_CACHE_DIR");
        }
    }
}

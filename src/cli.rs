//! Command-line interface parsing for statcache
//!
//! This module handles parsing of CLI arguments using clap. Every option can
//! also be supplied through a `STATCACHE_*` environment variable.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::refresh::{CoordinatorConfig, RefreshConfig};

/// Which snapshot store backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// JSON document in the cache directory; survives restarts
    File,
    /// Process memory; lost on exit
    Memory,
}

/// statcache - Serve the latest and previous upstream statistics snapshots
#[derive(Parser, Debug)]
#[command(name = "statcache")]
#[command(about = "Polls an upstream statistics endpoint and serves cached snapshots over HTTP")]
#[command(version)]
pub struct Cli {
    /// Upstream statistics endpoint returning a JSON object
    #[arg(long, env = "STATCACHE_UPSTREAM_URL")]
    pub upstream_url: String,

    /// Address the HTTP server binds to
    #[arg(long, env = "STATCACHE_LISTEN", default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Seconds between scheduled refreshes
    #[arg(long, env = "STATCACHE_REFRESH_INTERVAL_SECS", default_value_t = 900,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_interval_secs: u64,

    /// Seconds before an upstream fetch is abandoned
    #[arg(long, env = "STATCACHE_FETCH_TIMEOUT_SECS", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub fetch_timeout_secs: u64,

    /// Hours the replaced snapshot stays available as `previous`
    #[arg(long, env = "STATCACHE_PREVIOUS_TTL_HOURS", default_value_t = 10)]
    pub previous_ttl_hours: u64,

    /// Snapshot store backend
    #[arg(long, env = "STATCACHE_STORE", value_enum, default_value_t = StoreKind::File)]
    pub store: StoreKind,

    /// Directory for the file store (defaults to the XDG cache directory)
    #[arg(long, env = "STATCACHE_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Disable the periodic refresh
    #[arg(long)]
    pub no_auto_refresh: bool,

    /// Refresh once at startup instead of waiting for the first request
    #[arg(long)]
    pub warm: bool,
}

impl Cli {
    /// Upper bound on a single upstream fetch
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Settings for the periodic refresh task
    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            interval: Duration::from_secs(self.refresh_interval_secs),
            enabled: !self.no_auto_refresh,
        }
    }

    /// Settings for the refresh pipeline
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            previous_ttl: Duration::from_secs(self.previous_ttl_hours.saturating_mul(60 * 60)),
            fetch_timeout: self.fetch_timeout(),
            ..CoordinatorConfig::default()
        }
    }
}

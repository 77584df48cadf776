//! statcache - Serve cached upstream statistics over HTTP
//!
//! Polls the upstream endpoint on a fixed interval, keeps the latest snapshot
//! and the one it replaced, and answers `GET /` with both.

use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use statcache::cli::{Cli, StoreKind};
use statcache::{
    server, CacheManager, MemoryStore, QueryService, RefreshCoordinator, RefreshHandle,
    SnapshotStore, StatsClient,
};

/// Installs the global tracing subscriber; `RUST_LOG` overrides the `info` default
fn init_tracing() -> Result<(), Box<dyn Error>> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .finish(),
    )?;
    Ok(())
}

/// Builds the configured snapshot store
fn build_store(cli: &Cli) -> Result<Arc<dyn SnapshotStore>, Box<dyn Error>> {
    match cli.store {
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreKind::File => {
            let manager = match &cli.cache_dir {
                Some(dir) => CacheManager::with_dir(dir.clone()),
                None => CacheManager::new()
                    .ok_or("cannot determine a cache directory; pass --cache-dir")?,
            };
            info!(dir = %manager.cache_dir().display(), "using file store");
            Ok(Arc::new(manager))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing()?;

    info!(upstream = %cli.upstream_url, "starting statcache");

    let store = build_store(&cli)?;
    let fetcher = Arc::new(StatsClient::with_timeout(
        cli.upstream_url.clone(),
        cli.fetch_timeout(),
    ));
    let coordinator = RefreshCoordinator::new(fetcher, store, cli.coordinator_config());

    if cli.warm {
        if let Err(e) = coordinator.refresh().await {
            warn!(error = %e, "startup refresh failed");
        }
    }

    let refresh = RefreshHandle::spawn(coordinator.clone(), cli.refresh_config());

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    let router = server::router(QueryService::new(coordinator));
    let served = server::serve(listener, router, shutdown_signal()).await;

    refresh.shutdown().await;
    served?;

    info!("shutting down");
    Ok(())
}

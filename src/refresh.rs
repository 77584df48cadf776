//! Refresh coordination and the background refresh task
//!
//! [`RefreshCoordinator`] runs the fetch → compare → store pipeline under a
//! single lock and coalesces overlapping callers onto one execution.
//! [`RefreshHandle`] drives it from a periodic timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cache::{SlotWrite, SnapshotStore, StoreError};
use crate::data::{Fetcher, Slot, Snapshot, UpstreamError, TRACKED_FIELDS};
use crate::diff::changed;

/// Errors that can end a refresh
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// Fetching fresh data failed; nothing was written
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The snapshot store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Settings for the refresh pipeline
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Fields whose change causes `latest` to be replaced
    pub tracked_fields: Vec<String>,
    /// How long the replaced snapshot stays readable as `previous`
    pub previous_ttl: Duration,
    /// Upper bound on a single upstream fetch
    pub fetch_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tracked_fields: TRACKED_FIELDS.iter().map(|f| f.to_string()).collect(),
            previous_ttl: Duration::from_secs(10 * 60 * 60), // 10 hours
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of the most recent completed refresh
struct Flight {
    generation: u64,
    outcome: Option<Result<Snapshot, RefreshError>>,
}

struct Inner {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn SnapshotStore>,
    config: CoordinatorConfig,
    /// Held for the whole read → compare → write sequence
    flight: Mutex<Flight>,
    /// Mirrors `Flight::generation` so callers can sample it before queueing
    completed: AtomicU64,
}

/// Single-flight refresh of the cached snapshots
///
/// Cloning is cheap and every clone shares the same lock, so the timer task
/// and the query path coalesce onto each other.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn SnapshotStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                store,
                config,
                flight: Mutex::new(Flight {
                    generation: 0,
                    outcome: None,
                }),
                completed: AtomicU64::new(0),
            }),
        }
    }

    /// The store this coordinator writes to
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.inner.store
    }

    /// Fetches fresh data and updates the store if tracked fields moved
    ///
    /// Returns the freshly fetched snapshot. A caller that arrives while
    /// another refresh is running waits for it and receives its outcome
    /// instead of starting a second fetch.
    pub async fn refresh(&self) -> Result<Snapshot, RefreshError> {
        let seen = self.inner.completed.load(Ordering::Acquire);
        let mut flight = self.inner.flight.lock().await;

        if flight.generation != seen {
            if let Some(outcome) = &flight.outcome {
                debug!("joined a refresh that completed while waiting");
                return outcome.clone();
            }
        }

        let outcome = self.run().await;

        flight.generation += 1;
        flight.outcome = Some(outcome.clone());
        self.inner
            .completed
            .store(flight.generation, Ordering::Release);

        outcome
    }

    async fn run(&self) -> Result<Snapshot, RefreshError> {
        let inner = &self.inner;

        let fetch = tokio::time::timeout(inner.config.fetch_timeout, inner.fetcher.fetch());
        let fresh = match fetch.await {
            Ok(result) => result?,
            Err(_) => return Err(UpstreamError::Timeout(inner.config.fetch_timeout).into()),
        };

        let Some(current) = inner.store.get(Slot::Latest).await? else {
            inner.store.put(Slot::Latest, &fresh, None).await?;
            info!("cache was empty, stored first snapshot");
            return Ok(fresh);
        };

        if !changed(&inner.config.tracked_fields, &current, &fresh) {
            debug!("tracked fields unchanged, store left untouched");
            return Ok(fresh);
        }

        inner
            .store
            .put_many(&[
                SlotWrite {
                    slot: Slot::Previous,
                    snapshot: current,
                    ttl: Some(inner.config.previous_ttl),
                },
                SlotWrite {
                    slot: Slot::Latest,
                    snapshot: fresh.clone(),
                    ttl: None,
                },
            ])
            .await?;
        info!("tracked fields changed, rotated latest into previous");

        Ok(fresh)
    }
}

/// Configuration for the periodic refresh
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Interval between scheduled refreshes
    pub interval: Duration,
    /// Whether auto-refresh is enabled
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(900), // 15 minutes
            enabled: true,
        }
    }
}

/// Handle for controlling the background refresh task
pub struct RefreshHandle {
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl RefreshHandle {
    /// Spawns the periodic refresh task
    ///
    /// Errors from scheduled refreshes are logged and dropped; the task keeps
    /// running until [`RefreshHandle::shutdown`] is called.
    pub fn spawn(coordinator: RefreshCoordinator, config: RefreshConfig) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = config.enabled.then(move || {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // Skip the first tick (immediate)
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            match coordinator.refresh().await {
                                Ok(_) => debug!("scheduled refresh completed"),
                                Err(e) => warn!(error = %e, "scheduled refresh failed"),
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
                info!("refresh task stopped");
            })
        });

        Self { shutdown_tx, task }
    }

    /// Whether a refresh task is running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Shuts down the background refresh task and waits for it to stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                error!(error = %e, "refresh task ended abnormally");
            }
        }
    }
}

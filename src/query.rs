//! Answers requests for the current cache state

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::SnapshotStore;
use crate::data::{Slot, StatsView};
use crate::refresh::{RefreshCoordinator, RefreshError};

/// Read side of the cache
///
/// Serves `latest` and `previous` straight from the store, falling back to a
/// synchronous refresh when the cache is cold.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn SnapshotStore>,
    coordinator: RefreshCoordinator,
}

impl QueryService {
    /// Creates a query service reading from the coordinator's store
    pub fn new(coordinator: RefreshCoordinator) -> Self {
        Self {
            store: coordinator.store().clone(),
            coordinator,
        }
    }

    /// Returns the current snapshot and, if still live, the one before it
    ///
    /// On a cold cache this runs a refresh and returns its result with no
    /// `previous`. Upstream and store failures are returned to the caller.
    pub async fn get_stats(&self) -> Result<StatsView, RefreshError> {
        let mut slots = self
            .store
            .get_many(&[Slot::Latest, Slot::Previous])
            .await?
            .into_iter();
        let latest = slots.next().flatten();
        let previous = slots.next().flatten();

        if let Some(latest) = latest {
            debug!(has_previous = previous.is_some(), "serving cached stats");
            return Ok(StatsView { latest, previous });
        }

        info!("cache is cold, refreshing before serving");
        let latest = self.coordinator.refresh().await?;
        Ok(StatsView {
            latest,
            previous: None,
        })
    }
}

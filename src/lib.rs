//! statcache library
//!
//! A read-through cache over an upstream statistics endpoint. The modules are
//! exposed for the binary and for integration tests.

pub mod cache;
pub mod cli;
pub mod data;
pub mod diff;
pub mod query;
pub mod refresh;
pub mod server;

pub use cache::{CacheManager, MemoryStore, SnapshotStore, StoreError};
pub use data::{Fetcher, Slot, Snapshot, StatsClient, StatsView, UpstreamError};
pub use query::QueryService;
pub use refresh::{
    CoordinatorConfig, RefreshConfig, RefreshCoordinator, RefreshError, RefreshHandle,
};

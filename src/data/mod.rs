//! Core data models for the statistics cache
//!
//! This module contains the snapshot type that flows through the whole
//! application, the named cache slots it is stored under, and the view
//! returned to clients.

pub mod upstream;

pub use upstream::{Fetcher, StatsClient, UpstreamError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields compared between snapshots to decide whether upstream data moved
pub const TRACKED_FIELDS: [&str; 4] = [
    "samplesTestedPositive",
    "personsHospitalised",
    "deaths",
    "recovered",
];

/// One point-in-time read of the upstream statistics
///
/// A snapshot is an opaque JSON object. Only the tracked fields are ever
/// inspected; everything else is passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Map<String, Value>);

impl Snapshot {
    /// Builds a snapshot from an arbitrary JSON value
    ///
    /// Returns `None` unless the value is a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Looks up a single field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

/// A named cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The most recent snapshot; never expires
    Latest,
    /// The snapshot replaced by the last detected change; expires
    Previous,
}

impl Slot {
    /// Key the slot is persisted under
    pub fn key(self) -> &'static str {
        match self {
            Slot::Latest => "stats_latest",
            Slot::Previous => "stats_old",
        }
    }
}

/// Current cache state as served to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsView {
    /// The current snapshot
    pub latest: Snapshot,
    /// The snapshot before the last change, while it has not expired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Snapshot>,
}

//! Profile data models returned to the admin layer
//!
//! These are read-only export objects: built fresh per request from a shard
//! snapshot and never stored by the profiler.

use serde::Serialize;

use crate::domain::{ShardId, StackSignature, Timestamp};

/// One distinct stack and how often it was observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackCount {
    pub stack: StackSignature,
    #[serde(rename = "occurrences")]
    pub count: u64,
}

/// Aggregated profile of one shard
#[derive(Debug, Clone, Serialize)]
pub struct ShardProfile {
    pub shard_id: ShardId,
    pub sample_period_ms: u64,
    /// Nanoseconds since the profiler epoch
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    /// Sampler ticks since the last reset (captured, failed and idle)
    pub samples_taken: u64,
    /// Samples stored since the last reset, including evicted ones
    pub samples_recorded: u64,
    pub failed_captures: u64,
    /// Samples evicted from a full ring buffer
    pub dropped_samples: u64,
    /// Distinct stacks, most frequent first
    pub samples: Vec<StackCount>,
}

impl ShardProfile {
    /// Sum of all stack counts
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.samples.iter().map(|s| s.count).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn window_nanos(&self) -> u64 {
        self.window_end.saturating_since(self.window_start)
    }
}

/// Why a shard is missing from a [`ClusterProfile`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionDiagnostic {
    pub shard_id: ShardId,
    pub reason: String,
}

/// Profiles of every shard that answered, ordered by shard index
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterProfile {
    pub shards: Vec<ShardProfile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<CollectionDiagnostic>,
}

impl ClusterProfile {
    /// True when some shard was omitted
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    #[must_use]
    pub fn shard(&self, shard: ShardId) -> Option<&ShardProfile> {
        self.shards.iter().find(|p| p.shard_id == shard)
    }

    /// Total samples across every reported shard
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.shards.iter().map(ShardProfile::total_count).sum()
    }
}

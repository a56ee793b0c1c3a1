//! Structured error types for shardprof
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Only [`ProfilerError`] ever reaches a caller; [`CaptureError`] stays on the
//! shard that produced it and is folded into its counters.

use super::types::ShardId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Invalid sample period: {0}ms (must be strictly positive)")]
    InvalidSamplePeriod(u64),

    #[error("Invalid store capacity: {0}")]
    InvalidCapacity(String),

    #[error("{0} does not exist")]
    UnknownShard(ShardId),

    #[error("{shard} unavailable: {reason}")]
    ShardUnavailable { shard: ShardId, reason: String },

    #[error("All {attempted} shards failed to respond")]
    AllShardsUnavailable { attempted: usize },

    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a single sampler tick produced no sample.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureError {
    /// Nothing is running on the shard right now.
    #[error("shard is idle")]
    Idle,

    /// The stack was being rewritten while we read it.
    #[error("stack changed during capture")]
    Torn,

    /// The publishing thread left the stack in an impossible state.
    #[error("stack depth {0} out of range")]
    Corrupt(usize),
}

impl CaptureError {
    /// Idle ticks are expected and are not failures.
    #[must_use]
    pub fn is_failure(self) -> bool {
        !matches!(self, CaptureError::Idle)
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to serialize profile: {0}")]
    SerializationFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_period_display() {
        let err = ProfilerError::InvalidSamplePeriod(0);
        assert_eq!(err.to_string(), "Invalid sample period: 0ms (must be strictly positive)");
    }

    #[test]
    fn test_shard_unavailable_display() {
        let err = ProfilerError::ShardUnavailable {
            shard: ShardId(3),
            reason: "timed out after 100ms".to_string(),
        };
        assert!(err.to_string().contains("Shard#3"));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_idle_is_not_a_failure() {
        assert!(!CaptureError::Idle.is_failure());
        assert!(CaptureError::Torn.is_failure());
        assert!(CaptureError::Corrupt(99).is_failure());
    }
}

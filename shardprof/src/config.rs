//! Profiler configuration
//!
//! [`ProfilerConfig`] is the startup configuration (deserialized from JSON,
//! every field optional). [`SamplerSettings`] is the runtime-adjustable part
//! that the admin layer forwards verbatim to every shard.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::num::NonZeroU64;
use std::path::Path;
use std::time::Duration;

use crate::domain::ProfilerError;

pub const DEFAULT_SAMPLE_PERIOD_MS: u64 = 100;
pub const DEFAULT_RING_CAPACITY: usize = 4096;
pub const DEFAULT_MAX_DISTINCT_STACKS: usize = 1024;
pub const DEFAULT_COLLECT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_COMMAND_QUEUE_DEPTH: usize = 16;

/// How a shard's sample store holds what it has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// Raw samples in a ring buffer; the oldest sample is overwritten when full.
    Ring,
    /// Running `{stack -> count}`; individual timestamps are not kept.
    Aggregate,
}

/// What a successful read does to the store it read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPolicy {
    /// Reads leave the store untouched; counts only grow.
    Accumulate,
    /// Each read clears the store and its counters.
    ResetOnRead,
}

/// Runtime sampler settings: `{enabled, sample_period_ms}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSettings {
    pub enabled: bool,
    pub sample_period: NonZeroU64,
}

impl SamplerSettings {
    /// Validate raw admin input.
    ///
    /// # Errors
    /// Returns [`ProfilerError::InvalidSamplePeriod`] for a zero period.
    pub fn new(enabled: bool, sample_period_ms: u64) -> Result<Self, ProfilerError> {
        let sample_period = NonZeroU64::new(sample_period_ms)
            .ok_or(ProfilerError::InvalidSamplePeriod(sample_period_ms))?;
        Ok(Self { enabled, sample_period })
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.sample_period.get())
    }

    #[must_use]
    pub fn period_ms(&self) -> u64 {
        self.sample_period.get()
    }
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_period: NonZeroU64::new(DEFAULT_SAMPLE_PERIOD_MS)
                .unwrap_or(NonZeroU64::MIN),
        }
    }
}

/// Startup configuration for the whole profiler.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilerConfig {
    pub enabled: bool,
    pub sample_period_ms: u64,
    pub shard_count: usize,
    pub store_mode: StoreMode,
    pub ring_capacity: usize,
    pub max_distinct_stacks: usize,
    pub read_policy: ReadPolicy,
    pub collect_timeout_ms: u64,
    pub command_queue_depth: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_period_ms: DEFAULT_SAMPLE_PERIOD_MS,
            shard_count: std::thread::available_parallelism().map_or(1, usize::from),
            store_mode: StoreMode::Ring,
            ring_capacity: DEFAULT_RING_CAPACITY,
            max_distinct_stacks: DEFAULT_MAX_DISTINCT_STACKS,
            read_policy: ReadPolicy::Accumulate,
            collect_timeout_ms: DEFAULT_COLLECT_TIMEOUT_MS,
            command_queue_depth: DEFAULT_COMMAND_QUEUE_DEPTH,
        }
    }
}

impl ProfilerConfig {
    /// Parse a JSON document; absent fields take their defaults.
    ///
    /// # Errors
    /// Returns an error on malformed JSON, unknown fields, or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, ProfilerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Check every field that has a hard constraint.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ProfilerError> {
        self.sampler_settings()?;
        if self.shard_count == 0 {
            return Err(ProfilerError::InvalidCapacity("shard_count must be at least 1".into()));
        }
        if self.store_mode == StoreMode::Ring && self.ring_capacity == 0 {
            return Err(ProfilerError::InvalidCapacity("ring_capacity must be at least 1".into()));
        }
        if self.store_mode == StoreMode::Aggregate && self.max_distinct_stacks == 0 {
            return Err(ProfilerError::InvalidCapacity(
                "max_distinct_stacks must be at least 1".into(),
            ));
        }
        if self.collect_timeout_ms == 0 {
            return Err(ProfilerError::InvalidCapacity(
                "collect_timeout_ms must be at least 1".into(),
            ));
        }
        if self.command_queue_depth == 0 {
            return Err(ProfilerError::InvalidCapacity(
                "command_queue_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The runtime part of this configuration.
    ///
    /// # Errors
    /// Returns [`ProfilerError::InvalidSamplePeriod`] for a zero period.
    pub fn sampler_settings(&self) -> Result<SamplerSettings, ProfilerError> {
        SamplerSettings::new(self.enabled, self.sample_period_ms)
    }

    #[must_use]
    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }
}

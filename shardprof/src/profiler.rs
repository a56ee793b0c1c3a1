//! # Profiler Engine
//!
//! Owns the shard set: one [`ExecutionContext`] and one [`ShardTask`] per
//! shard, plus the [`ProfileCollector`] that reads them. This is the surface
//! the admin layer calls: `configure`, `collect_all`, `collect_shard`.

use std::sync::Arc;

use log::{info, warn};
use tokio::task::JoinHandle;

use crate::collector::ProfileCollector;
use crate::config::{ProfilerConfig, SamplerSettings};
use crate::domain::{ProfilerClock, ProfilerError, ShardId};
use crate::profile_data::{ClusterProfile, ShardProfile};
use crate::profiling::{ExecutionContext, ShardHandle, ShardTask, StackSource};

struct ShardSlot {
    context: Arc<ExecutionContext>,
    handle: ShardHandle,
    task: JoinHandle<()>,
}

pub struct Profiler {
    config: ProfilerConfig,
    clock: ProfilerClock,
    shards: Vec<ShardSlot>,
    collector: ProfileCollector,
}

impl Profiler {
    /// Spawn one shard task per configured shard on the current tokio runtime.
    ///
    /// # Errors
    /// Returns an error if `config` does not validate.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn start(config: ProfilerConfig) -> Result<Self, ProfilerError> {
        config.validate()?;
        let clock = ProfilerClock::new();

        let shard_count = u32::try_from(config.shard_count)
            .map_err(|_| ProfilerError::InvalidCapacity("too many shards".into()))?;
        let mut shards = Vec::with_capacity(config.shard_count);
        for index in 0..shard_count {
            let shard = ShardId(index);
            let context = ExecutionContext::new(shard);
            let source: Arc<dyn StackSource> = context.clone();
            let (task, handle) = ShardTask::new(shard, source, &config, clock)?;
            let task = tokio::spawn(task.run());
            shards.push(ShardSlot { context, handle, task });
        }

        let collector = ProfileCollector::new(
            shards.iter().map(|slot| slot.handle.clone()).collect(),
            config.collect_timeout(),
        );

        info!(
            "Profiler started: {} shards, sampling {} every {}ms, {:?} store",
            config.shard_count,
            if config.enabled { "enabled" } else { "disabled" },
            config.sample_period_ms,
            config.store_mode,
        );
        Ok(Self { config, clock, shards, collector })
    }

    #[must_use]
    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    #[must_use]
    pub fn clock(&self) -> ProfilerClock {
        self.clock
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// The publication point workload code on `shard` writes its stack into.
    ///
    /// # Errors
    /// [`ProfilerError::UnknownShard`] for an id outside the shard set.
    pub fn context(&self, shard: ShardId) -> Result<Arc<ExecutionContext>, ProfilerError> {
        self.shards
            .get(shard.index())
            .map(|slot| Arc::clone(&slot.context))
            .ok_or(ProfilerError::UnknownShard(shard))
    }

    /// Every shard's context, in shard order.
    #[must_use]
    pub fn contexts(&self) -> Vec<Arc<ExecutionContext>> {
        self.shards.iter().map(|slot| Arc::clone(&slot.context)).collect()
    }

    #[must_use]
    pub fn collector(&self) -> &ProfileCollector {
        &self.collector
    }

    /// Forward `{enabled, sample_period_ms}` to every shard.
    ///
    /// The input is validated once up front: an invalid period is rejected
    /// before any shard sees it, so every shard keeps its previous settings.
    ///
    /// # Errors
    /// [`ProfilerError::InvalidSamplePeriod`] for a zero period, or the first
    /// shard that could not be reached.
    pub async fn configure(
        &self,
        enabled: bool,
        sample_period_ms: u64,
    ) -> Result<(), ProfilerError> {
        let settings = SamplerSettings::new(enabled, sample_period_ms)?;
        self.apply(settings).await
    }

    /// Forward already-validated settings to every shard.
    ///
    /// # Errors
    /// The first shard that could not be reached; the others still apply.
    pub async fn apply(&self, settings: SamplerSettings) -> Result<(), ProfilerError> {
        let limit = self.config.collect_timeout();
        let mut first_error = None;
        for slot in &self.shards {
            let applied = match tokio::time::timeout(limit, slot.handle.configure(settings)).await
            {
                Ok(result) => result,
                Err(_) => Err(ProfilerError::ShardUnavailable {
                    shard: slot.handle.shard(),
                    reason: "timed out applying settings".to_string(),
                }),
            };
            if let Err(err) = applied {
                warn!("Failed to configure {}: {err}", slot.handle.shard());
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Fetch every shard's profile. See [`ProfileCollector::collect_all`].
    ///
    /// # Errors
    /// [`ProfilerError::AllShardsUnavailable`] when no shard answered.
    pub async fn collect_all(&self) -> Result<ClusterProfile, ProfilerError> {
        self.collector.collect_all().await
    }

    /// Fetch one shard's profile.
    ///
    /// # Errors
    /// [`ProfilerError::UnknownShard`] or [`ProfilerError::ShardUnavailable`].
    pub async fn collect_shard(&self, shard: ShardId) -> Result<ShardProfile, ProfilerError> {
        self.collector.collect_shard(shard).await
    }

    /// Clear every shard's store and counters.
    ///
    /// # Errors
    /// The first shard that could not be reached; the others still reset.
    pub async fn reset_all(&self) -> Result<(), ProfilerError> {
        let mut first_error = None;
        for slot in &self.shards {
            if let Err(err) = slot.handle.reset().await {
                warn!("Failed to reset {}: {err}", slot.handle.shard());
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stop every shard task and wait for them to exit.
    pub async fn shutdown(self) {
        for slot in &self.shards {
            slot.handle.shutdown().await;
        }
        for slot in self.shards {
            if let Err(err) = slot.task.await {
                warn!("Shard task ended abnormally: {err}");
            }
        }
        info!("Profiler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(shards: usize) -> ProfilerConfig {
        ProfilerConfig {
            enabled: true,
            sample_period_ms: 5,
            shard_count: shards,
            ..ProfilerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let bad = ProfilerConfig { sample_period_ms: 0, ..config(2) };
        assert!(matches!(Profiler::start(bad), Err(ProfilerError::InvalidSamplePeriod(0))));
    }

    #[tokio::test]
    async fn test_contexts_are_per_shard() {
        let profiler = Profiler::start(config(3)).unwrap();
        assert_eq!(profiler.shard_count(), 3);
        assert_eq!(profiler.context(ShardId(2)).unwrap().shard(), ShardId(2));
        assert!(matches!(
            profiler.context(ShardId(3)),
            Err(ProfilerError::UnknownShard(ShardId(3)))
        ));
        profiler.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_period_keeps_previous_settings() {
        let profiler = Profiler::start(config(2)).unwrap();

        let err = profiler.configure(true, 0).await.unwrap_err();
        assert!(matches!(err, ProfilerError::InvalidSamplePeriod(0)));

        let profile = profiler.collect_all().await.unwrap();
        assert!(profile.shards.iter().all(|p| p.sample_period_ms == 5));
        profiler.shutdown().await;
    }

    #[tokio::test]
    async fn test_configure_reaches_every_shard() {
        let profiler = Profiler::start(config(2)).unwrap();
        profiler.configure(true, 40).await.unwrap();

        let profile = profiler.collect_all().await.unwrap();
        assert!(profile.shards.iter().all(|p| p.sample_period_ms == 40));
        profiler.shutdown().await;
    }
}

//! # Shard Task
//!
//! One autonomous tokio task per shard. The task exclusively owns the shard's
//! [`Sampler`] and [`SampleStore`]; nobody else ever touches them.
//!
//! ## Event Loop
//!
//! ```text
//!            ┌──────────────── ShardHandle (any context) ───────────────┐
//!            │ Configure / Snapshot / Reset / Shutdown  (bounded mpsc)  │
//!            └───────────────────────────┬──────────────────────────────┘
//!                                        ▼
//!  tick timer ──▶ select! { commands (biased first), tick if Enabled }
//!                    │                          │
//!                    ▼                          ▼
//!         reply via oneshot            Sampler::on_tick(&mut store)
//! ```
//!
//! Cross-context reads are request/response handoffs into this loop, so a
//! snapshot always sees the store between two ticks, never mid-insert, and
//! the sampling hot path takes no lock.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::diagnostics::{log_sampler_statistics, SamplerStats};
use super::execution_context::StackSource;
use super::sampler::Sampler;
use crate::analysis::profile_aggregator;
use crate::config::{ProfilerConfig, ReadPolicy, SamplerSettings};
use crate::domain::{ProfilerClock, ProfilerError, ShardId};
use crate::profile_data::ShardProfile;
use crate::store::{SampleStore, StoreSnapshot};

/// Requests served by a shard task.
#[derive(Debug)]
pub(crate) enum ShardCommand {
    Configure { settings: SamplerSettings, reply: oneshot::Sender<()> },
    Snapshot { reply: oneshot::Sender<ShardReport> },
    Reset { reply: oneshot::Sender<()> },
    Shutdown,
}

/// Everything one snapshot request copies out of a shard, in one turn.
#[derive(Debug, Clone)]
pub struct ShardReport {
    pub shard: ShardId,
    pub settings: SamplerSettings,
    pub snapshot: StoreSnapshot,
    pub stats: SamplerStats,
}

impl ShardReport {
    /// Aggregate into the exported form.
    #[must_use]
    pub fn into_profile(self) -> ShardProfile {
        profile_aggregator::build(self.shard, self.snapshot, self.stats, self.settings.period_ms())
    }
}

/// Cloneable cross-context handle to one shard task.
#[derive(Debug, Clone)]
pub struct ShardHandle {
    shard: ShardId,
    commands: mpsc::Sender<ShardCommand>,
}

impl ShardHandle {
    pub(crate) fn from_sender(shard: ShardId, commands: mpsc::Sender<ShardCommand>) -> Self {
        Self { shard, commands }
    }

    #[must_use]
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Apply settings; resolves once the shard has applied them.
    ///
    /// # Errors
    /// [`ProfilerError::ShardUnavailable`] if the task is gone.
    pub async fn configure(&self, settings: SamplerSettings) -> Result<(), ProfilerError> {
        let (reply, response) = oneshot::channel();
        self.send(ShardCommand::Configure { settings, reply }).await?;
        response.await.map_err(|_| self.unavailable("dropped the configure request"))
    }

    /// Copy the store and counters out of the shard.
    ///
    /// # Errors
    /// [`ProfilerError::ShardUnavailable`] if the task is gone.
    pub async fn snapshot(&self) -> Result<ShardReport, ProfilerError> {
        let (reply, response) = oneshot::channel();
        self.send(ShardCommand::Snapshot { reply }).await?;
        response.await.map_err(|_| self.unavailable("dropped the snapshot request"))
    }

    /// Snapshot and aggregate.
    ///
    /// # Errors
    /// [`ProfilerError::ShardUnavailable`] if the task is gone.
    pub async fn profile(&self) -> Result<ShardProfile, ProfilerError> {
        Ok(self.snapshot().await?.into_profile())
    }

    /// Clear the store and counters.
    ///
    /// # Errors
    /// [`ProfilerError::ShardUnavailable`] if the task is gone.
    pub async fn reset(&self) -> Result<(), ProfilerError> {
        let (reply, response) = oneshot::channel();
        self.send(ShardCommand::Reset { reply }).await?;
        response.await.map_err(|_| self.unavailable("dropped the reset request"))
    }

    /// Ask the task to exit. A task that is already gone is not an error.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(ShardCommand::Shutdown).await;
    }

    async fn send(&self, command: ShardCommand) -> Result<(), ProfilerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| self.unavailable("shard task has stopped"))
    }

    fn unavailable(&self, reason: &str) -> ProfilerError {
        ProfilerError::ShardUnavailable { shard: self.shard, reason: reason.to_string() }
    }
}

/// The per-shard event loop and the state it owns.
pub struct ShardTask {
    shard: ShardId,
    sampler: Sampler,
    store: SampleStore,
    clock: ProfilerClock,
    read_policy: ReadPolicy,
    commands: mpsc::Receiver<ShardCommand>,
}

impl ShardTask {
    /// Create a task and its handle. Nothing runs until [`ShardTask::run`]
    /// is spawned.
    ///
    /// # Errors
    /// Returns an error if `config` does not validate.
    pub fn new(
        shard: ShardId,
        source: Arc<dyn StackSource>,
        config: &ProfilerConfig,
        clock: ProfilerClock,
    ) -> Result<(Self, ShardHandle), ProfilerError> {
        config.validate()?;
        let (tx, commands) = mpsc::channel(config.command_queue_depth);
        let task = Self {
            shard,
            sampler: Sampler::new(shard, source, config.sampler_settings()?, clock),
            store: SampleStore::from_config(config, clock.now()),
            clock,
            read_policy: config.read_policy,
            commands,
        };
        Ok((task, ShardHandle::from_sender(shard, tx)))
    }

    /// Serve ticks and commands until shutdown or until every handle is gone.
    pub async fn run(mut self) {
        let mut ticker = arm_ticker(self.sampler.settings().period());
        debug!("{}: shard task started", self.shard);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    match command {
                        ShardCommand::Configure { settings, reply } => {
                            if self.sampler.configure(settings).needs_rearm() {
                                ticker = arm_ticker(settings.period());
                            }
                            let _ = reply.send(());
                        }
                        ShardCommand::Snapshot { reply } => {
                            // Only a delivered snapshot may clear the window
                            if reply.send(self.report()).is_err() {
                                debug!("{}: snapshot requester went away", self.shard);
                            } else if self.read_policy == ReadPolicy::ResetOnRead {
                                self.reset();
                            }
                        }
                        ShardCommand::Reset { reply } => {
                            self.reset();
                            let _ = reply.send(());
                        }
                        ShardCommand::Shutdown => break,
                    }
                }
                _ = ticker.tick(), if self.sampler.is_enabled() => {
                    self.sampler.on_tick(&mut self.store);
                }
            }
        }

        log_sampler_statistics(self.shard, &self.sampler.stats());
        info!("{}: shard task stopped", self.shard);
    }

    fn report(&self) -> ShardReport {
        ShardReport {
            shard: self.shard,
            settings: self.sampler.settings(),
            snapshot: self.store.snapshot(self.clock.now()),
            stats: self.sampler.stats(),
        }
    }

    fn reset(&mut self) {
        self.store.reset(self.clock.now());
        self.sampler.reset_stats();
    }
}

/// First tick one full period from now; late ticks are skipped, not bunched.
fn arm_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreMode;
    use crate::domain::{FrameId, StackSignature};
    use crate::profiling::ExecutionContext;

    fn config(enabled: bool, period_ms: u64) -> ProfilerConfig {
        ProfilerConfig {
            enabled,
            sample_period_ms: period_ms,
            shard_count: 1,
            ..ProfilerConfig::default()
        }
    }

    fn spawn_shard(config: &ProfilerConfig) -> (ShardHandle, Arc<ExecutionContext>) {
        let context = ExecutionContext::new(ShardId(0));
        let (task, handle) =
            ShardTask::new(ShardId(0), context.clone(), config, ProfilerClock::new())
                .unwrap();
        tokio::spawn(task.run());
        (handle, context)
    }

    #[tokio::test]
    async fn test_snapshot_of_fresh_shard_is_empty() {
        let (handle, _context) = spawn_shard(&config(true, 5));
        let report = handle.snapshot().await.unwrap();
        assert_eq!(report.shard, ShardId(0));
        assert!(report.snapshot.entries.is_empty());
        assert_eq!(report.snapshot.recorded, 0);
    }

    #[tokio::test]
    async fn test_enabled_shard_records_busy_stack() {
        let (handle, context) = spawn_shard(&config(true, 2));
        let publisher = context.publisher().unwrap();
        let _guard = publisher.enter(FrameId(0x42));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let profile = handle.profile().await.unwrap();

        assert!(profile.samples_taken > 0);
        assert_eq!(profile.samples.len(), 1);
        assert_eq!(profile.samples[0].stack, StackSignature::new(&[FrameId(0x42)]));
        assert_eq!(profile.total_count(), profile.samples_recorded);
    }

    #[tokio::test]
    async fn test_idle_shard_ticks_without_samples() {
        let (handle, _context) = spawn_shard(&config(true, 2));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let report = handle.snapshot().await.unwrap();
        assert!(report.stats.ticks > 0);
        assert_eq!(report.stats.idle_ticks, report.stats.ticks);
        assert!(report.snapshot.entries.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_shard_does_not_sample() {
        let (handle, context) = spawn_shard(&config(false, 2));
        let publisher = context.publisher().unwrap();
        let _guard = publisher.enter(FrameId(1));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let report = handle.snapshot().await.unwrap();
        assert_eq!(report.stats.ticks, 0);
        assert_eq!(report.snapshot.recorded, 0);
    }

    #[tokio::test]
    async fn test_reset_on_read_clears_after_snapshot() {
        let config = ProfilerConfig {
            read_policy: ReadPolicy::ResetOnRead,
            store_mode: StoreMode::Aggregate,
            ..config(true, 2)
        };
        let (handle, context) = spawn_shard(&config);
        let publisher = context.publisher().unwrap();
        let guard = publisher.enter(FrameId(7));
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(guard);
        handle.configure(SamplerSettings::new(false, 2).unwrap()).await.unwrap();

        let first = handle.snapshot().await.unwrap();
        assert!(first.snapshot.recorded > 0);
        let second = handle.snapshot().await.unwrap();
        assert_eq!(second.snapshot.recorded, 0);
        assert_eq!(second.stats.ticks, 0);
    }

    #[tokio::test]
    async fn test_reset_on_read_keeps_undelivered_snapshot() {
        let config = ProfilerConfig {
            read_policy: ReadPolicy::ResetOnRead,
            store_mode: StoreMode::Aggregate,
            ..config(true, 2)
        };
        let (handle, context) = spawn_shard(&config);
        let publisher = context.publisher().unwrap();
        let guard = publisher.enter(FrameId(7));
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(guard);
        handle.configure(SamplerSettings::new(false, 2).unwrap()).await.unwrap();

        // Polling the snapshot once queues the request; the ready branch then
        // wins and drops the pending reply before the shard task runs
        tokio::select! {
            biased;
            _ = handle.snapshot() => panic!("shard answered before it could run"),
            () = std::future::ready(()) => {}
        }

        let report = handle.snapshot().await.unwrap();
        assert!(report.snapshot.recorded > 0);
        assert!(report.stats.ticks > 0);
    }

    #[tokio::test]
    async fn test_shutdown_makes_shard_unavailable() {
        let (handle, _context) = spawn_shard(&config(true, 5));
        handle.shutdown().await;
        // Let the task observe the command and exit
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = handle.snapshot().await.unwrap_err();
        assert!(matches!(err, ProfilerError::ShardUnavailable { shard: ShardId(0), .. }));
    }
}

//! # Sampler
//!
//! Per-shard tick handler. The shard task drives [`Sampler::on_tick`] from its
//! own timer; the sampler captures whatever stack its [`StackSource`] shows,
//! timestamps it and inserts it into the shard's [`SampleStore`].
//!
//! ## State Machine
//!
//! ```text
//!            configure(enabled=true)
//!   Disabled ───────────────────────▶ Enabled
//!      ▲                                 │
//!      └─────────────────────────────────┘
//!            configure(enabled=false)
//! ```
//!
//! Disabling stops ticks but keeps everything already stored.

use std::sync::Arc;

use log::{info, trace};

use super::diagnostics::SamplerStats;
use super::execution_context::StackSource;
use crate::config::SamplerSettings;
use crate::domain::{CaptureError, ProfilerClock, Sample, ShardId};
use crate::store::SampleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Disabled,
    Enabled,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Captured,
    Idle,
    Failed(CaptureError),
    /// The tick arrived after a disable; nothing was counted.
    Ignored,
}

/// What a `configure` call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureOutcome {
    pub state_changed: bool,
    pub period_changed: bool,
}

impl ConfigureOutcome {
    /// Whether the tick timer has to be re-armed.
    #[must_use]
    pub fn needs_rearm(&self) -> bool {
        self.state_changed || self.period_changed
    }
}

pub struct Sampler {
    shard: ShardId,
    source: Arc<dyn StackSource>,
    settings: SamplerSettings,
    clock: ProfilerClock,
    stats: SamplerStats,
}

impl Sampler {
    #[must_use]
    pub fn new(
        shard: ShardId,
        source: Arc<dyn StackSource>,
        settings: SamplerSettings,
        clock: ProfilerClock,
    ) -> Self {
        Self { shard, source, settings, clock, stats: SamplerStats::default() }
    }

    #[must_use]
    pub fn state(&self) -> SamplerState {
        if self.settings.enabled {
            SamplerState::Enabled
        } else {
            SamplerState::Disabled
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    #[must_use]
    pub fn settings(&self) -> SamplerSettings {
        self.settings
    }

    #[must_use]
    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Apply new settings. Stored samples are never touched; a new period
    /// applies from the next scheduled tick.
    pub fn configure(&mut self, settings: SamplerSettings) -> ConfigureOutcome {
        let outcome = ConfigureOutcome {
            state_changed: settings.enabled != self.settings.enabled,
            period_changed: settings.sample_period != self.settings.sample_period,
        };
        if outcome.needs_rearm() {
            info!(
                "{}: sampler {} (period {}ms)",
                self.shard,
                if settings.enabled { "enabled" } else { "disabled" },
                settings.period_ms(),
            );
        }
        self.settings = settings;
        outcome
    }

    /// Take one sample. Never blocks and never retries: a failed capture is
    /// counted and the tick is over.
    pub fn on_tick(&mut self, store: &mut SampleStore) -> TickOutcome {
        if !self.settings.enabled {
            return TickOutcome::Ignored;
        }
        self.stats.ticks += 1;

        match self.source.capture() {
            Ok(stack) => {
                store.insert(Sample { timestamp: self.clock.now(), stack });
                self.stats.captured += 1;
                TickOutcome::Captured
            }
            Err(CaptureError::Idle) => {
                self.stats.idle_ticks += 1;
                TickOutcome::Idle
            }
            Err(err) => {
                self.stats.failed_captures += 1;
                trace!("{}: capture skipped: {err}", self.shard);
                TickOutcome::Failed(err)
            }
        }
    }

    /// Zero the counters (done together with a store reset).
    pub fn reset_stats(&mut self) {
        self.stats = SamplerStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FrameId, StackSignature, Timestamp};
    use std::sync::Mutex;

    /// Replays a fixed script of capture results.
    struct ScriptedSource(Mutex<Vec<Result<StackSignature, CaptureError>>>);

    impl ScriptedSource {
        fn new(mut script: Vec<Result<StackSignature, CaptureError>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self(Mutex::new(script)))
        }
    }

    impl StackSource for ScriptedSource {
        fn capture(&self) -> Result<StackSignature, CaptureError> {
            self.0.lock().unwrap().pop().unwrap_or(Err(CaptureError::Idle))
        }
    }

    fn stack(ids: &[u64]) -> StackSignature {
        StackSignature::from(ids.iter().copied().map(FrameId).collect::<Vec<_>>())
    }

    fn enabled(period_ms: u64) -> SamplerSettings {
        SamplerSettings::new(true, period_ms).unwrap()
    }

    #[test]
    fn test_every_tick_is_counted_once() {
        let source = ScriptedSource::new(vec![
            Ok(stack(&[1, 2])),
            Err(CaptureError::Torn),
            Err(CaptureError::Idle),
            Ok(stack(&[1, 3])),
        ]);
        let mut sampler = Sampler::new(ShardId(0), source, enabled(10), ProfilerClock::new());
        let mut store = SampleStore::ring(16, Timestamp(0));

        let outcomes: Vec<TickOutcome> = (0..4).map(|_| sampler.on_tick(&mut store)).collect();
        assert_eq!(
            outcomes,
            vec![
                TickOutcome::Captured,
                TickOutcome::Failed(CaptureError::Torn),
                TickOutcome::Idle,
                TickOutcome::Captured,
            ]
        );

        let stats = sampler.stats();
        assert_eq!(stats.ticks, 4);
        assert_eq!(stats.captured, 2);
        assert_eq!(stats.failed_captures, 1);
        assert_eq!(stats.idle_ticks, 1);
        assert_eq!(store.recorded(), 2);
    }

    #[test]
    fn test_disabled_sampler_ignores_ticks() {
        let source = ScriptedSource::new(vec![Ok(stack(&[1]))]);
        let disabled = SamplerSettings::new(false, 10).unwrap();
        let mut sampler = Sampler::new(ShardId(0), source, disabled, ProfilerClock::new());
        let mut store = SampleStore::ring(4, Timestamp(0));

        assert_eq!(sampler.state(), SamplerState::Disabled);
        assert_eq!(sampler.on_tick(&mut store), TickOutcome::Ignored);
        assert_eq!(sampler.stats().ticks, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_disable_keeps_stored_samples() {
        let source = ScriptedSource::new(vec![Ok(stack(&[1])), Ok(stack(&[2]))]);
        let mut sampler = Sampler::new(ShardId(0), source, enabled(10), ProfilerClock::new());
        let mut store = SampleStore::ring(4, Timestamp(0));
        sampler.on_tick(&mut store);

        let outcome = sampler.configure(SamplerSettings::new(false, 10).unwrap());
        assert!(outcome.state_changed);
        assert!(!outcome.period_changed);
        assert_eq!(sampler.on_tick(&mut store), TickOutcome::Ignored);
        assert_eq!(store.recorded(), 1);
    }

    #[test]
    fn test_period_change_requests_rearm() {
        let source = ScriptedSource::new(vec![]);
        let mut sampler = Sampler::new(ShardId(0), source, enabled(100), ProfilerClock::new());

        assert!(!sampler.configure(enabled(100)).needs_rearm());
        let outcome = sampler.configure(enabled(50));
        assert!(outcome.period_changed);
        assert_eq!(sampler.settings().period_ms(), 50);
    }
}

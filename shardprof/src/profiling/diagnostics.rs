//! Per-shard sampler counters
//!
//! Kept by the shard task alongside its store and copied out with every
//! snapshot, so a profile always carries the counters of the same instant.

use log::info;

use crate::domain::ShardId;

/// Counters for one shard's sampler since its last reset.
///
/// `ticks == captured + failed_captures + idle_ticks` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Every tick, whatever its outcome
    pub ticks: u64,
    /// Ticks that stored a sample
    pub captured: u64,
    /// Ticks whose stack could not be read
    pub failed_captures: u64,
    /// Ticks that found nothing running
    pub idle_ticks: u64,
}

impl SamplerStats {
    /// Fraction of non-idle ticks that failed, 0.0 when there were none.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let attempts = self.captured + self.failed_captures;
        if attempts == 0 {
            0.0
        } else {
            self.failed_captures as f64 / attempts as f64
        }
    }
}

/// Log a one-line summary of a shard's counters.
pub fn log_sampler_statistics(shard: ShardId, stats: &SamplerStats) {
    info!(
        "{shard}: ticks={} captured={} failed={} idle={} (failure rate {:.1}%)",
        stats.ticks,
        stats.captured,
        stats.failed_captures,
        stats.idle_ticks,
        stats.failure_rate() * 100.0,
    );
}

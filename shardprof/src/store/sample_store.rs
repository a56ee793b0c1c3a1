//! Per-shard sample storage.
//!
//! A [`SampleStore`] is owned by exactly one shard task and is only ever
//! touched from that task: the sampler inserts into it on ticks and snapshot
//! requests are served between ticks. It is therefore plain `&mut self` code
//! with no interior synchronization.
//!
//! # Modes
//!
//! - **Ring**: raw samples, oldest silently overwritten. Sum of snapshot
//!   counts never exceeds the capacity; evictions are counted as dropped.
//! - **Aggregate**: running `{stack -> count}` in first-seen order. Sum of
//!   snapshot counts always equals `recorded`. The number of distinct
//!   stacks is bounded; stacks beyond the bound are folded into an
//!   overflow bucket keyed by the empty signature.

use std::collections::HashMap;

use log::debug;

use super::ring_buffer::RingBuffer;
use crate::config::{ProfilerConfig, StoreMode};
use crate::domain::{Sample, StackSignature, Timestamp};

#[derive(Debug)]
enum Storage {
    Ring(RingBuffer<Sample>),
    Aggregate {
        /// `(stack, count)` in first-seen order
        buckets: Vec<(StackSignature, u64)>,
        /// stack -> position in `buckets`
        index: HashMap<StackSignature, usize>,
        max_distinct_stacks: usize,
    },
}

/// A consistent view of one store, taken in a single owning-task turn.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// `(stack, count)` oldest / first-seen first. Ring mode yields one entry
    /// per retained sample with a count of 1.
    pub entries: Vec<(StackSignature, u64)>,
    /// Samples inserted since the last reset, including evicted ones.
    pub recorded: u64,
    /// Samples evicted from a full ring since the last reset.
    pub dropped: u64,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
}

impl StoreSnapshot {
    /// Sum of every entry's count.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.entries.iter().map(|(_, count)| count).sum()
    }
}

#[derive(Debug)]
pub struct SampleStore {
    storage: Storage,
    recorded: u64,
    dropped: u64,
    /// Time of creation or of the last reset.
    reset_at: Timestamp,
}

impl SampleStore {
    #[must_use]
    pub fn ring(capacity: usize, now: Timestamp) -> Self {
        Self::with_storage(Storage::Ring(RingBuffer::new(capacity)), now)
    }

    #[must_use]
    pub fn aggregate(max_distinct_stacks: usize, now: Timestamp) -> Self {
        Self::with_storage(
            Storage::Aggregate {
                buckets: Vec::new(),
                index: HashMap::new(),
                max_distinct_stacks,
            },
            now,
        )
    }

    /// Build the store the configuration asks for.
    #[must_use]
    pub fn from_config(config: &ProfilerConfig, now: Timestamp) -> Self {
        match config.store_mode {
            StoreMode::Ring => Self::ring(config.ring_capacity, now),
            StoreMode::Aggregate => Self::aggregate(config.max_distinct_stacks, now),
        }
    }

    fn with_storage(storage: Storage, now: Timestamp) -> Self {
        Self { storage, recorded: 0, dropped: 0, reset_at: now }
    }

    /// O(1) amortized.
    pub fn insert(&mut self, sample: Sample) {
        self.recorded += 1;
        match &mut self.storage {
            Storage::Ring(ring) => {
                if ring.push(sample).is_some() {
                    self.dropped += 1;
                }
            }
            Storage::Aggregate { buckets, index, max_distinct_stacks } => {
                let key = if index.contains_key(&sample.stack)
                    || index.len() < *max_distinct_stacks
                {
                    sample.stack
                } else {
                    StackSignature::empty()
                };
                let position = *index.entry(key.clone()).or_insert_with(|| {
                    buckets.push((key, 0));
                    buckets.len() - 1
                });
                buckets[position].1 += 1;
            }
        }
    }

    #[must_use]
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of samples (ring) or distinct stacks (aggregate) held.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Ring(ring) => ring.len(),
            Storage::Aggregate { buckets, .. } => buckets.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the current contents.
    #[must_use]
    pub fn snapshot(&self, now: Timestamp) -> StoreSnapshot {
        let (entries, window_start) = match &self.storage {
            Storage::Ring(ring) => {
                let start = ring.oldest().map_or(self.reset_at, |sample| sample.timestamp);
                let entries = ring.iter().map(|sample| (sample.stack.clone(), 1)).collect();
                (entries, start)
            }
            Storage::Aggregate { buckets, .. } => (buckets.clone(), self.reset_at),
        };
        StoreSnapshot {
            entries,
            recorded: self.recorded,
            dropped: self.dropped,
            window_start,
            window_end: now,
        }
    }

    /// Clear every sample and zero the counters.
    pub fn reset(&mut self, now: Timestamp) {
        match &mut self.storage {
            Storage::Ring(ring) => ring.clear(),
            Storage::Aggregate { buckets, index, .. } => {
                buckets.clear();
                index.clear();
            }
        }
        debug!("sample store reset after {} samples ({} dropped)", self.recorded, self.dropped);
        self.recorded = 0;
        self.dropped = 0;
        self.reset_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FrameId;

    fn sample(ts: u64, frames: &[u64]) -> Sample {
        Sample {
            timestamp: Timestamp(ts),
            stack: StackSignature::from(frames.iter().copied().map(FrameId).collect::<Vec<_>>()),
        }
    }

    #[test]
    fn test_ring_snapshot_is_bounded_by_capacity() {
        let mut store = SampleStore::ring(3, Timestamp(0));
        for ts in 1..=5 {
            store.insert(sample(ts, &[1, ts]));
        }

        let snap = store.snapshot(Timestamp(10));
        assert_eq!(snap.entries.len(), 3);
        assert_eq!(snap.total_count(), 3);
        assert_eq!(snap.recorded, 5);
        assert_eq!(snap.dropped, 2);
        // Window starts at the oldest retained sample, not at creation
        assert_eq!(snap.window_start, Timestamp(3));
        assert_eq!(snap.window_end, Timestamp(10));
    }

    #[test]
    fn test_aggregate_counts_match_recorded() {
        let mut store = SampleStore::aggregate(16, Timestamp(0));
        store.insert(sample(1, &[1, 2]));
        store.insert(sample(2, &[1, 3]));
        store.insert(sample(3, &[1, 2]));

        let snap = store.snapshot(Timestamp(4));
        assert_eq!(snap.total_count(), snap.recorded);
        assert_eq!(snap.entries.len(), 2);
        // First-seen order
        assert_eq!(snap.entries[0].0.frames(), &[FrameId(1), FrameId(2)]);
        assert_eq!(snap.entries[0].1, 2);
        assert_eq!(snap.window_start, Timestamp(0));
    }

    #[test]
    fn test_aggregate_overflow_bucket_preserves_total() {
        let mut store = SampleStore::aggregate(2, Timestamp(0));
        store.insert(sample(1, &[1]));
        store.insert(sample(2, &[2]));
        store.insert(sample(3, &[3]));
        store.insert(sample(4, &[4]));
        store.insert(sample(5, &[1]));

        let snap = store.snapshot(Timestamp(6));
        assert_eq!(snap.total_count(), 5);
        assert_eq!(snap.entries.len(), 3);
        let overflow = snap.entries.iter().find(|(stack, _)| stack.is_empty()).unwrap();
        assert_eq!(overflow.1, 2);
    }

    #[test]
    fn test_reset_clears_samples_and_counters() {
        let mut store = SampleStore::ring(2, Timestamp(0));
        store.insert(sample(1, &[1]));
        store.insert(sample(2, &[1]));
        store.insert(sample(3, &[1]));
        store.reset(Timestamp(7));

        assert!(store.is_empty());
        assert_eq!(store.recorded(), 0);
        assert_eq!(store.dropped(), 0);
        let snap = store.snapshot(Timestamp(8));
        assert!(snap.entries.is_empty());
        assert_eq!(snap.window_start, Timestamp(7));
    }

    #[test]
    fn test_snapshot_does_not_change_store() {
        let mut store = SampleStore::aggregate(4, Timestamp(0));
        store.insert(sample(1, &[9]));
        let first = store.snapshot(Timestamp(2));
        let second = store.snapshot(Timestamp(3));
        assert_eq!(first.entries, second.entries);
        assert_eq!(store.recorded(), 1);
    }
}

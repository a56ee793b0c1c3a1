//! Shard profile aggregation.
//!
//! Turns a [`StoreSnapshot`] into a [`ShardProfile`]: identical stacks are
//! grouped, counted and ordered by descending count. Ties keep first-seen
//! order (stable sort) so two reads of the same store render identically.
//!
//! # Guarantees
//!
//! - sum of output counts == sum of snapshot counts
//! - no stack appears twice in the output
//! - an empty snapshot gives an empty `samples` list, not an error
//!
//! # Performance
//!
//! O(n) grouping plus O(k log k) sorting for k distinct stacks. Runs on the
//! collecting context, never on the shard that owns the store.

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::domain::{ShardId, StackSignature};
use crate::profile_data::{ShardProfile, StackCount};
use crate::profiling::SamplerStats;
use crate::store::StoreSnapshot;

/// Group `(stack, count)` entries by stack, most frequent first.
#[must_use]
pub fn aggregate_stacks<I>(entries: I) -> Vec<StackCount>
where
    I: IntoIterator<Item = (StackSignature, u64)>,
{
    let mut positions: HashMap<StackSignature, usize> = HashMap::new();
    let mut counts: Vec<StackCount> = Vec::new();

    for (stack, count) in entries {
        if count == 0 {
            continue;
        }
        match positions.get(&stack) {
            Some(&position) => counts[position].count += count,
            None => {
                positions.insert(stack.clone(), counts.len());
                counts.push(StackCount { stack, count });
            }
        }
    }

    // Stable: equal counts stay in first-seen order
    counts.sort_by_key(|entry| Reverse(entry.count));
    counts
}

/// Build the exported profile of one shard.
#[must_use]
pub fn build(
    shard_id: ShardId,
    snapshot: StoreSnapshot,
    stats: SamplerStats,
    sample_period_ms: u64,
) -> ShardProfile {
    ShardProfile {
        shard_id,
        sample_period_ms,
        window_start: snapshot.window_start,
        window_end: snapshot.window_end,
        samples_taken: stats.ticks,
        samples_recorded: snapshot.recorded,
        failed_captures: stats.failed_captures,
        dropped_samples: snapshot.dropped,
        samples: aggregate_stacks(snapshot.entries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FrameId, Timestamp};

    fn stack(ids: &[u64]) -> StackSignature {
        StackSignature::from(ids.iter().copied().map(FrameId).collect::<Vec<_>>())
    }

    fn snapshot(entries: Vec<(StackSignature, u64)>) -> StoreSnapshot {
        let recorded = entries.iter().map(|(_, c)| c).sum();
        StoreSnapshot {
            entries,
            recorded,
            dropped: 0,
            window_start: Timestamp(5),
            window_end: Timestamp(50),
        }
    }

    #[test]
    fn test_groups_identical_stacks() {
        let counts = aggregate_stacks(vec![
            (stack(&[1, 2]), 1),
            (stack(&[1, 3]), 1),
            (stack(&[1, 2]), 1),
            (stack(&[1, 2]), 1),
        ]);

        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].stack, stack(&[1, 2]));
        assert_eq!(counts[0].count, 3);
        assert_eq!(counts[1].count, 1);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let counts = aggregate_stacks(vec![
            (stack(&[9]), 1),
            (stack(&[4]), 2),
            (stack(&[7]), 1),
            (stack(&[8]), 2),
        ]);

        let order: Vec<&StackSignature> = counts.iter().map(|c| &c.stack).collect();
        assert_eq!(order, vec![&stack(&[4]), &stack(&[8]), &stack(&[9]), &stack(&[7])]);
    }

    #[test]
    fn test_build_preserves_totals() {
        let snap = snapshot(vec![(stack(&[1]), 4), (stack(&[2]), 2), (stack(&[1]), 1)]);
        let stats = SamplerStats { ticks: 9, captured: 7, failed_captures: 1, idle_ticks: 1 };
        let profile = build(ShardId(2), snap, stats, 50);

        assert_eq!(profile.shard_id, ShardId(2));
        assert_eq!(profile.sample_period_ms, 50);
        assert_eq!(profile.total_count(), 7);
        assert_eq!(profile.samples_taken, 9);
        assert_eq!(profile.failed_captures, 1);
        assert_eq!(profile.window_start, Timestamp(5));
        assert_eq!(profile.window_end, Timestamp(50));
        assert_eq!(profile.samples[0].count, 5);
    }

    #[test]
    fn test_empty_snapshot_is_an_empty_profile() {
        let profile = build(ShardId(0), snapshot(vec![]), SamplerStats::default(), 100);
        assert!(profile.is_empty());
        assert_eq!(profile.total_count(), 0);
    }
}

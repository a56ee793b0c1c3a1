//! Hotspot analysis across shards.
//!
//! Folds every shard's stack counts into per-leaf-frame totals: which frame
//! was on top of the stack most often, and on which shards.
//!
//! # Architecture
//!
//! - **`FrameHotspot`** - one leaf frame with its totals
//! - **`analyze_hotspots()`** - batch analysis from a `ClusterProfile`
//!
//! # Performance
//!
//! - O(total distinct stacks) grouping
//! - O(n log n) sorting where n = unique leaf frames

// Percentage calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use crate::domain::{FrameId, ShardId, StackSignature};
use crate::profile_data::ClusterProfile;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum call stacks kept per hotspot.
///
/// A leaf frame reached from many paths would otherwise carry every one of
/// them; the first few by frequency show the main call patterns.
const MAX_CALL_STACKS_PER_HOTSPOT: usize = 5;

// =============================================================================
// FRAME HOTSPOT (OUTPUT TYPE)
// =============================================================================

/// A leaf frame with aggregated statistics.
///
/// ```text
/// HOTSPOTS
/// ─────────────────────────────────
///   0x1003   42.3%   shards 0,1,2
///   0x1002   18.7%   shards 0,2
/// ```
#[derive(Debug, Clone)]
pub struct FrameHotspot {
    /// Innermost frame of the stacks counted here.
    pub frame: FrameId,

    /// Total sample count across all shards.
    pub count: u64,

    /// Percentage of all samples (0.0 - 100.0).
    pub percentage: f64,

    /// Per-shard breakdown, ordered by shard index.
    pub shards: BTreeMap<ShardId, u64>,

    /// Most frequent full stacks ending in this frame.
    ///
    /// Limited to `MAX_CALL_STACKS_PER_HOTSPOT`, most frequent first.
    pub call_stacks: Vec<(StackSignature, u64)>,
}

#[derive(Default)]
struct FrameTotals {
    count: u64,
    shards: BTreeMap<ShardId, u64>,
    /// stack -> count, merged across shards
    stacks: HashMap<StackSignature, u64>,
}

/// Analyze a cluster profile to find the hottest leaf frames.
///
/// The empty overflow stack has no leaf and is only counted in the
/// denominator.
#[must_use]
pub fn analyze_hotspots(profile: &ClusterProfile) -> Vec<FrameHotspot> {
    let mut frames: HashMap<FrameId, FrameTotals> = HashMap::new();
    let mut total_samples: u64 = 0;

    for shard in &profile.shards {
        for entry in &shard.samples {
            total_samples += entry.count;
            let Some(leaf) = entry.stack.leaf() else {
                continue;
            };
            let totals = frames.entry(leaf).or_default();
            totals.count += entry.count;
            *totals.shards.entry(shard.shard_id).or_insert(0) += entry.count;
            *totals.stacks.entry(entry.stack.clone()).or_insert(0) += entry.count;
        }
    }

    let mut hotspots: Vec<FrameHotspot> = frames
        .into_iter()
        .map(|(frame, totals)| {
            let percentage = if total_samples > 0 {
                (totals.count as f64 / total_samples as f64) * 100.0
            } else {
                0.0
            };

            let mut call_stacks: Vec<(StackSignature, u64)> = totals.stacks.into_iter().collect();
            call_stacks.sort_unstable_by(|a, b| {
                b.1.cmp(&a.1).then_with(|| a.0.frames().cmp(b.0.frames()))
            });
            call_stacks.truncate(MAX_CALL_STACKS_PER_HOTSPOT);

            FrameHotspot {
                frame,
                count: totals.count,
                percentage,
                shards: totals.shards,
                call_stacks,
            }
        })
        .collect();

    // Ties broken by frame id so the ranking is deterministic
    hotspots.sort_unstable_by_key(|h| (Reverse(h.count), h.frame));
    hotspots
}

//! Analysis logic for profiling data
//!
//! Pure functions over snapshots and profiles, with no knowledge of shards
//! or tasks:
//! - `profile_aggregator`: snapshot -> `ShardProfile`
//! - `hotspot_analyzer`: `ClusterProfile` -> hottest leaf frames

pub mod hotspot_analyzer;
pub mod profile_aggregator;

pub use hotspot_analyzer::{analyze_hotspots, FrameHotspot};
pub use profile_aggregator::aggregate_stacks;

//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep shard indices, frame identifiers and
//! profiler timestamps from being mixed up in function signatures.

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Maximum number of frames kept in one captured stack.
///
/// Deeper stacks keep their outermost frames and lose the innermost ones,
/// so every captured stack still starts at its root. This holds both for
/// [`StackSignature::new`] and for stacks published through an execution
/// context.
pub const MAX_STACK_DEPTH: usize = 64;

/// Shard index (0-indexed)
///
/// Stable for the lifetime of the process; a shard never migrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ShardId(pub u32);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shard#{}", self.0)
    }
}

impl ShardId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Opaque frame identifier (a return address or an interned call-site id).
///
/// Zero is reserved and never stored in a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl FrameId {
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl Serialize for FrameId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One captured call stack, outermost frame first.
///
/// Immutable once captured. Frames live behind an `Arc` so the store,
/// snapshots and exported profiles share one allocation per capture.
/// Two signatures are equal iff their frame sequences are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackSignature(Arc<[FrameId]>);

impl StackSignature {
    /// Build a signature, keeping at most [`MAX_STACK_DEPTH`] outermost frames.
    #[must_use]
    pub fn new(frames: &[FrameId]) -> Self {
        let end = frames.len().min(MAX_STACK_DEPTH);
        Self(Arc::from(&frames[..end]))
    }

    /// The empty signature. Used as the overflow bucket in aggregate mode.
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    #[must_use]
    pub fn frames(&self) -> &[FrameId] {
        &self.0
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Innermost frame, i.e. what was executing when the sample fired.
    #[must_use]
    pub fn leaf(&self) -> Option<FrameId> {
        self.0.last().copied()
    }
}

impl Default for StackSignature {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<FrameId>> for StackSignature {
    fn from(frames: Vec<FrameId>) -> Self {
        Self::new(&frames)
    }
}

impl fmt::Display for StackSignature {
    /// Collapsed-stack form: `0x1;0x2;0x3`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, frame) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(";")?;
            }
            write!(f, "{frame}")?;
        }
        Ok(())
    }
}

impl Serialize for StackSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for frame in self.0.iter() {
            seq.serialize_element(frame)?;
        }
        seq.end()
    }
}

/// Timestamp in nanoseconds since the profiler epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Convert to seconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Convert to milliseconds (u64, truncating)
    #[must_use]
    pub fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Nanoseconds elapsed since `earlier`, zero if `earlier` is later.
    #[must_use]
    pub fn saturating_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Process-wide clock shared by every shard.
///
/// All shard timestamps are measured from the same epoch, which is what
/// makes per-shard windows in one cluster profile comparable.
#[derive(Debug, Clone, Copy)]
pub struct ProfilerClock {
    epoch: Instant,
}

impl ProfilerClock {
    #[must_use]
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }

    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn now(&self) -> Timestamp {
        Timestamp(self.epoch.elapsed().as_nanos() as u64)
    }
}

impl Default for ProfilerClock {
    fn default() -> Self {
        Self::new()
    }
}

/// One timestamped capture, owned by the store of the shard that took it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub stack: StackSignature,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(ids: &[u64]) -> Vec<FrameId> {
        ids.iter().copied().map(FrameId).collect()
    }

    #[test]
    fn test_signature_equality_is_elementwise() {
        let a = StackSignature::from(frames(&[1, 2, 3]));
        let b = StackSignature::from(frames(&[1, 2, 3]));
        let c = StackSignature::from(frames(&[1, 3, 2]));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_signature_keeps_outermost_frames() {
        let deep: Vec<u64> = (1..=(MAX_STACK_DEPTH as u64 + 10)).collect();
        let sig = StackSignature::from(frames(&deep));
        assert_eq!(sig.depth(), MAX_STACK_DEPTH);
        assert_eq!(sig.frames()[0], FrameId(1));
        assert_eq!(sig.leaf(), Some(FrameId(MAX_STACK_DEPTH as u64)));
    }

    #[test]
    fn test_signature_display_is_collapsed() {
        let sig = StackSignature::from(frames(&[0x10, 0xab]));
        assert_eq!(sig.to_string(), "0x10;0xab");
        assert_eq!(StackSignature::empty().to_string(), "");
    }

    #[test]
    fn test_signature_serializes_as_hex_strings() {
        let sig = StackSignature::from(frames(&[255, 16]));
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, r#"["0xff","0x10"]"#);
    }

    #[test]
    fn test_shard_id_display() {
        assert_eq!(ShardId(2).to_string(), "Shard#2");
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = ProfilerClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert_eq!(b.saturating_since(a), b.0 - a.0);
        assert_eq!(a.saturating_since(b), 0);
    }
}

//! # Execution Context
//!
//! Shard-local publication point for "what is running right now".
//!
//! Workload code running on a shard's compute thread announces the frames
//! it enters through a [`StackPublisher`]; the shard's sampler reads them
//! through the [`StackSource`] trait on every tick.
//!
//! ## Protocol
//!
//! A single writer and any number of readers share a sequence lock built
//! from atomics:
//!
//! ```text
//! writer:  seq += 1 (odd)  ─▶ write depth/frames ─▶ seq += 1 (even)
//! reader:  s1 = seq ─▶ copy depth/frames ─▶ s2 = seq ─▶ s1 == s2 && even ?
//! ```
//!
//! The reader never waits. A read that overlaps a write is reported as
//! [`CaptureError::Torn`] and the tick is skipped, so the sampler can never
//! stall the workload and the workload never waits on the sampler.
//!
//! Stacks deeper than [`MAX_STACK_DEPTH`] keep their outermost frames; the
//! extra depth is tracked so pops stay balanced.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::domain::{CaptureError, FrameId, ShardId, StackSignature, MAX_STACK_DEPTH};

/// Anything the sampler can read a stack from.
///
/// Implementations must be cheap (bounded, small constant cost) and must
/// fail instead of blocking or retrying.
pub trait StackSource: Send + Sync {
    /// Capture the stack executing at this instant.
    ///
    /// # Errors
    /// [`CaptureError::Idle`] when nothing runs, other variants when the
    /// stack could not be read consistently.
    fn capture(&self) -> Result<StackSignature, CaptureError>;
}

/// Published stack of one shard.
#[derive(Debug)]
pub struct ExecutionContext {
    shard: ShardId,
    seq: AtomicU64,
    depth: AtomicUsize,
    frames: [AtomicU64; MAX_STACK_DEPTH],
    publisher_taken: AtomicBool,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(shard: ShardId) -> Arc<Self> {
        Arc::new(Self {
            shard,
            seq: AtomicU64::new(0),
            depth: AtomicUsize::new(0),
            frames: std::array::from_fn(|_| AtomicU64::new(0)),
            publisher_taken: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Hand out the one writer for this context.
    ///
    /// Returns `None` if a publisher was already taken; a context has at most
    /// one writer for its whole life.
    #[must_use]
    pub fn publisher(self: &Arc<Self>) -> Option<StackPublisher> {
        if self.publisher_taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(StackPublisher {
            context: Arc::clone(self),
            depth: Cell::new(0),
            _not_sync: PhantomData,
        })
    }

    /// Current published depth without a consistency check (diagnostics only).
    #[must_use]
    pub fn depth_hint(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    fn write_begin(&self) -> u64 {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        seq
    }

    fn write_end(&self, seq: u64) {
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }
}

impl StackSource for ExecutionContext {
    fn capture(&self) -> Result<StackSignature, CaptureError> {
        let before = self.seq.load(Ordering::Acquire);
        if before % 2 == 1 {
            return Err(CaptureError::Torn);
        }

        let depth = self.depth.load(Ordering::Relaxed);
        let visible = depth.min(MAX_STACK_DEPTH);
        let mut frames = [FrameId(0); MAX_STACK_DEPTH];
        for (slot, frame) in frames.iter_mut().zip(&self.frames).take(visible) {
            *slot = FrameId(frame.load(Ordering::Relaxed));
        }

        fence(Ordering::Acquire);
        if self.seq.load(Ordering::Relaxed) != before {
            return Err(CaptureError::Torn);
        }

        if visible == 0 {
            return Err(CaptureError::Idle);
        }
        if frames[..visible].iter().any(|frame| !frame.is_valid()) {
            return Err(CaptureError::Corrupt(depth));
        }
        Ok(StackSignature::new(&frames[..visible]))
    }
}

impl<T: StackSource + ?Sized> StackSource for Arc<T> {
    fn capture(&self) -> Result<StackSignature, CaptureError> {
        (**self).capture()
    }
}

/// The single writer of an [`ExecutionContext`].
///
/// `Send` so it can move to the shard's compute thread, but not `Sync`
/// and not `Clone`: only one thread can ever publish into a context.
#[derive(Debug)]
pub struct StackPublisher {
    context: Arc<ExecutionContext>,
    /// Writer-side copy of the depth, avoids re-reading the atomic.
    depth: Cell<usize>,
    _not_sync: PhantomData<Cell<()>>,
}

impl StackPublisher {
    #[must_use]
    pub fn shard(&self) -> ShardId {
        self.context.shard
    }

    /// Push `frame`; it is popped when the returned guard drops.
    ///
    /// Frame id zero is reserved: a stack containing it fails to capture.
    #[must_use = "the frame is popped as soon as the guard is dropped"]
    pub fn enter(&self, frame: FrameId) -> FrameGuard<'_> {
        let depth = self.depth.get();
        let seq = self.context.write_begin();
        if let Some(slot) = self.context.frames.get(depth) {
            slot.store(frame.0, Ordering::Relaxed);
        }
        self.context.depth.store(depth + 1, Ordering::Relaxed);
        self.context.write_end(seq);
        self.depth.set(depth + 1);
        FrameGuard { publisher: self }
    }

    /// Replace the whole published stack, outermost frame first.
    ///
    /// For adapters that obtain a complete stack in one go rather than
    /// through nested guards. Must not be mixed with live guards.
    pub fn publish(&self, frames: &[FrameId]) {
        let seq = self.context.write_begin();
        for (slot, frame) in self.context.frames.iter().zip(frames) {
            slot.store(frame.0, Ordering::Relaxed);
        }
        self.context.depth.store(frames.len(), Ordering::Relaxed);
        self.context.write_end(seq);
        self.depth.set(frames.len());
    }

    /// Mark the shard idle.
    pub fn clear(&self) {
        self.publish(&[]);
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    fn pop(&self) {
        let depth = self.depth.get().saturating_sub(1);
        let seq = self.context.write_begin();
        self.context.depth.store(depth, Ordering::Relaxed);
        self.context.write_end(seq);
        self.depth.set(depth);
    }
}

impl Drop for StackPublisher {
    fn drop(&mut self) {
        self.clear();
        self.context.publisher_taken.store(false, Ordering::Release);
    }
}

/// Pops its frame on drop.
#[derive(Debug)]
pub struct FrameGuard<'a> {
    publisher: &'a StackPublisher,
}

impl FrameGuard<'_> {
    /// Enter a nested frame.
    #[must_use = "the frame is popped as soon as the guard is dropped"]
    pub fn enter(&self, frame: FrameId) -> FrameGuard<'_> {
        self.publisher.enter(frame)
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.publisher.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_context_reports_idle() {
        let context = ExecutionContext::new(ShardId(0));
        assert_eq!(context.capture(), Err(CaptureError::Idle));
    }

    #[test]
    fn test_nested_guards_publish_and_pop() {
        let context = ExecutionContext::new(ShardId(0));
        let publisher = context.publisher().unwrap();

        let outer = publisher.enter(FrameId(0x10));
        {
            let _inner = outer.enter(FrameId(0x20));
            let stack = context.capture().unwrap();
            assert_eq!(stack.frames(), &[FrameId(0x10), FrameId(0x20)]);
        }
        assert_eq!(context.capture().unwrap().frames(), &[FrameId(0x10)]);
        drop(outer);
        assert_eq!(context.capture(), Err(CaptureError::Idle));
    }

    #[test]
    fn test_only_one_publisher() {
        let context = ExecutionContext::new(ShardId(1));
        let publisher = context.publisher();
        assert!(publisher.is_some());
        assert!(context.publisher().is_none());

        // Dropping the writer releases the slot and idles the shard
        drop(publisher);
        assert!(context.publisher().is_some());
        assert_eq!(context.capture(), Err(CaptureError::Idle));
    }

    #[test]
    fn test_reserved_frame_is_corrupt() {
        let context = ExecutionContext::new(ShardId(0));
        let publisher = context.publisher().unwrap();
        publisher.publish(&[FrameId(1), FrameId(0)]);
        assert_eq!(context.capture(), Err(CaptureError::Corrupt(2)));
    }

    #[test]
    fn test_deep_stack_keeps_outermost_frames() {
        let context = ExecutionContext::new(ShardId(0));
        let publisher = context.publisher().unwrap();
        let frames: Vec<FrameId> =
            (1..=(MAX_STACK_DEPTH as u64 + 5)).map(FrameId).collect();
        publisher.publish(&frames);

        let stack = context.capture().unwrap();
        assert_eq!(stack.depth(), MAX_STACK_DEPTH);
        assert_eq!(stack.frames()[0], FrameId(1));

        // Frames past the limit are counted but not visible
        let guard = publisher.enter(FrameId(999));
        assert_eq!(publisher.depth(), MAX_STACK_DEPTH + 6);
        assert_eq!(context.capture().unwrap().leaf(), Some(FrameId(MAX_STACK_DEPTH as u64)));
        drop(guard);
        assert_eq!(publisher.depth(), MAX_STACK_DEPTH + 5);
    }

    #[test]
    fn test_concurrent_reads_never_see_torn_stacks() {
        let context = ExecutionContext::new(ShardId(0));
        let publisher = context.publisher().unwrap();
        let reader = Arc::clone(&context);

        let writer = std::thread::spawn(move || {
            for round in 1..5_000u64 {
                // Every published stack is [round, round, round]
                publisher.publish(&[FrameId(round), FrameId(round), FrameId(round)]);
            }
        });

        for _ in 0..5_000 {
            match reader.capture() {
                Ok(stack) => {
                    let first = stack.frames()[0];
                    assert!(stack.frames().iter().all(|frame| *frame == first));
                    assert_eq!(stack.depth(), 3);
                }
                Err(CaptureError::Torn | CaptureError::Idle) => {}
                Err(other) => panic!("unexpected capture error: {other}"),
            }
        }
        writer.join().unwrap();
    }
}

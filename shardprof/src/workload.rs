//! Synthetic CPU-bound workload
//!
//! One OS thread per shard, each publishing its frames into that shard's
//! [`ExecutionContext`] while it burns CPU. Used by the demo binary and by
//! the integration tests as the "traffic" that gives the sampler something
//! to see. Threads stop when the workload's stop channel disconnects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::{debug, info, warn};

use crate::domain::FrameId;
use crate::profiling::{ExecutionContext, StackPublisher};

pub const FRAME_SHARD_LOOP: FrameId = FrameId(0x1000);
pub const FRAME_PRODUCE: FrameId = FrameId(0x1100);
pub const FRAME_CHECKSUM: FrameId = FrameId(0x1110);
pub const FRAME_COMPRESS: FrameId = FrameId(0x1120);
pub const FRAME_FLUSH: FrameId = FrameId(0x1200);

/// Readable names for the workload's frames, for display only.
#[must_use]
pub fn frame_name(frame: FrameId) -> Option<&'static str> {
    match frame {
        FRAME_SHARD_LOOP => Some("workload::shard_loop"),
        FRAME_PRODUCE => Some("workload::produce_batch"),
        FRAME_CHECKSUM => Some("workload::checksum_record"),
        FRAME_COMPRESS => Some("workload::compress_record"),
        FRAME_FLUSH => Some("workload::flush_batch"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkloadOptions {
    /// Records per batch; one batch is one unit of progress.
    pub batch_size: usize,
    /// Mixing rounds per record, i.e. how much CPU one record costs.
    pub rounds_per_record: u32,
    /// Sleep between batches (zero for a fully busy shard).
    pub pause: Duration,
}

impl Default for WorkloadOptions {
    fn default() -> Self {
        Self { batch_size: 64, rounds_per_record: 2_000, pause: Duration::ZERO }
    }
}

/// Running workload threads.
pub struct Workload {
    stop: Option<Sender<()>>,
    threads: Vec<JoinHandle<()>>,
    progress: Arc<AtomicU64>,
}

impl Workload {
    /// Start one thread per context.
    ///
    /// # Errors
    /// Fails if a context already has a publisher or a thread cannot spawn.
    pub fn spawn(contexts: &[Arc<ExecutionContext>], options: WorkloadOptions) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let progress = Arc::new(AtomicU64::new(0));
        let mut threads = Vec::with_capacity(contexts.len());

        for context in contexts {
            let Some(publisher) = context.publisher() else {
                bail!("{} already has a stack publisher", context.shard());
            };
            let stop = stop_rx.clone();
            let progress = Arc::clone(&progress);
            let handle = thread::Builder::new()
                .name(format!("shard-{}", context.shard().0))
                .spawn(move || run_shard(&publisher, &stop, &progress, options))
                .context("Failed to spawn workload thread")?;
            threads.push(handle);
        }

        info!("Workload started on {} shards", threads.len());
        Ok(Self { stop: Some(stop_tx), threads, progress })
    }

    /// Batches completed so far, across all shards.
    #[must_use]
    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Wait until `target` batches have completed.
    ///
    /// # Errors
    /// Fails if the target is not reached within `limit`.
    pub async fn await_progress(&self, target: u64, limit: Duration) -> Result<u64> {
        let start = Instant::now();
        loop {
            let progress = self.progress();
            if progress >= target {
                return Ok(progress);
            }
            if start.elapsed() >= limit {
                bail!("workload reached {progress}/{target} batches in {limit:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop every thread and wait for it to exit. Returns final progress.
    pub fn stop(mut self) -> u64 {
        self.stop.take();
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("workload").to_string();
            if handle.join().is_err() {
                warn!("Workload thread {name} panicked");
            }
        }
        self.progress()
    }
}

impl Drop for Workload {
    fn drop(&mut self) {
        // Disconnecting the channel is enough; threads exit on their own
        self.stop.take();
    }
}

fn run_shard(
    publisher: &StackPublisher,
    stop: &Receiver<()>,
    progress: &AtomicU64,
    options: WorkloadOptions,
) {
    let shard = publisher.shard();
    let root = publisher.enter(FRAME_SHARD_LOOP);
    let mut state: u64 = u64::from(shard.0) + 1;
    let mut batches: u64 = 0;

    while matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
        {
            let produce = root.enter(FRAME_PRODUCE);
            for record in 0..options.batch_size {
                let frame = if record % 4 == 0 { FRAME_COMPRESS } else { FRAME_CHECKSUM };
                let _step = produce.enter(frame);
                state = mix(state, options.rounds_per_record);
            }
        }
        {
            let _flush = root.enter(FRAME_FLUSH);
            state = mix(state, options.rounds_per_record / 2);
        }
        std::hint::black_box(state);

        batches += 1;
        progress.fetch_add(1, Ordering::Relaxed);
        if !options.pause.is_zero() {
            thread::sleep(options.pause);
        }
    }

    debug!("{shard}: workload stopped after {batches} batches");
}

/// xorshift rounds; cheap, branch-free and impossible to optimize away.
fn mix(mut state: u64, rounds: u32) -> u64 {
    for _ in 0..rounds {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
    }
    state
}

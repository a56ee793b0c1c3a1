//! Profiling core modules
//!
//! The write path of the profiler, all of it shard-local:
//! - Stack publication and lock-free capture (`execution_context`)
//! - The tick handler and its enable/disable state machine (`sampler`)
//! - The per-shard task that owns sampler and store (`shard`)
//! - Sampler counters (`diagnostics`)

pub mod diagnostics;
pub mod execution_context;
pub mod sampler;
pub mod shard;

// Re-export common types
pub use diagnostics::{log_sampler_statistics, SamplerStats};
pub use execution_context::{ExecutionContext, FrameGuard, StackPublisher, StackSource};
pub use sampler::{Sampler, SamplerState, TickOutcome};
pub use shard::{ShardHandle, ShardReport, ShardTask};

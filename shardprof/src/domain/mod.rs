//! Domain model for shardprof
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{
    FrameId, ProfilerClock, Sample, ShardId, StackSignature, Timestamp, MAX_STACK_DEPTH,
};

pub use errors::{CaptureError, ExportError, ProfilerError};

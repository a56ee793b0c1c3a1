//! # shardprof - Per-Shard Sampling Profiler
//!
//! A cluster-wide sampling profiler for shard-per-core servers. Every shard
//! periodically captures the call stack currently executing on it, keeps the
//! samples locally, and serves them on request. An admin layer toggles
//! sampling, sets the period, and collects an aggregated profile from every
//! shard at once.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Workload threads (one per shard)                   │
//! │        StackPublisher::enter(frame) ... guard dropped           │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ seqlock writes (no locks, no allocation)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                ExecutionContext (per shard)                     │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ StackSource::capture on every tick
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   ShardTask (per shard)                         │
//! │  ┌──────────────┐   ┌──────────────┐                            │
//! │  │   Sampler    │──▶│ SampleStore  │  ring or aggregate         │
//! │  └──────────────┘   └──────┬───────┘                            │
//! └────────────────────────────┼────────────────────────────────────┘
//!                              │ snapshot via ShardHandle (mpsc + oneshot)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ProfileCollector ──▶ ClusterProfile ──▶ analysis / export      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`profiler`]: the engine; starts shards, forwards settings, collects
//! - [`profiling`]: per-shard machinery
//!   - `execution_context`: where a shard publishes its current stack
//!   - `sampler`: the tick handler and its state machine
//!   - `shard`: the shard task event loop and its cross-context handle
//! - [`store`]: per-shard sample storage (ring buffer or stack counts)
//! - [`collector`]: parallel fan-out with per-shard timeouts
//! - [`analysis`]: stack aggregation and leaf-frame hotspots
//! - [`export`]: JSON and collapsed-stack output
//! - [`config`]: startup configuration and runtime sampler settings
//! - [`workload`]: synthetic CPU workload driving the demo and tests
//! - [`cli`]: command-line arguments of the demo binary
//! - [`domain`]: core types (`ShardId`, `FrameId`, `StackSignature`) and errors
//!
//! ## Key Concepts
//!
//! - **Shard**: an isolated unit of execution with its own state; nothing
//!   on the sampling path crosses shards
//! - **Stack signature**: an immutable, hashable sequence of frame ids
//! - **Window**: the time span a shard's reported samples cover
//! - **Partial profile**: a cluster profile missing shards that did not
//!   answer in time, each named in the profile's diagnostics

pub mod analysis;
pub mod cli;
pub mod collector;
pub mod config;
pub mod domain;
pub mod export;
pub mod profile_data;
pub mod profiler;
pub mod profiling;
pub mod store;
pub mod workload;

pub use collector::ProfileCollector;
pub use config::{ProfilerConfig, SamplerSettings};
pub use profile_data::{ClusterProfile, ShardProfile};
pub use profiler::Profiler;

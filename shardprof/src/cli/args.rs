//! CLI argument definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{ProfilerConfig, ReadPolicy, StoreMode};

#[derive(Parser, Debug)]
#[command(
    name = "shardprof",
    about = "Sample per-shard call stacks of a synthetic workload and report hotspots",
    after_help = "\
EXAMPLES:
    shardprof                                 One shard per CPU, sample every 100ms for 5s
    shardprof --shards 3 --period-ms 5        Faster sampling on 3 shards
    shardprof --progress 500 --export p.json  Stop after 500 batches, export JSON
    shardprof --export p.folded               Export collapsed stacks for flamegraphs"
)]
pub struct Args {
    /// Number of shards (default: available parallelism)
    #[arg(long)]
    pub shards: Option<usize>,

    /// Sampling period in milliseconds
    #[arg(long, value_name = "MS")]
    pub period_ms: Option<u64>,

    /// Stop after N seconds (0 = until Ctrl+C or --progress)
    #[arg(long, default_value = "5")]
    pub duration: u64,

    /// Stop once the workload has completed N batches
    #[arg(long, value_name = "BATCHES")]
    pub progress: Option<u64>,

    /// Load profiler configuration from a JSON file; flags override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Export the cluster profile (.json, or .folded for collapsed stacks)
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// How each shard stores samples
    #[arg(long, value_enum)]
    pub store: Option<StoreArg>,

    /// Clear each shard's samples after it is read
    #[arg(long)]
    pub reset_on_read: bool,

    /// Number of hotspots printed in the summary
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreArg {
    Ring,
    Aggregate,
}

impl From<StoreArg> for StoreMode {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Ring => StoreMode::Ring,
            StoreArg::Aggregate => StoreMode::Aggregate,
        }
    }
}

impl Args {
    /// Apply command-line overrides on top of a loaded or default config.
    /// The binary always samples, so `enabled` is forced on.
    pub fn apply_overrides(&self, config: &mut ProfilerConfig) {
        config.enabled = true;
        if let Some(shards) = self.shards {
            config.shard_count = shards;
        }
        if let Some(period_ms) = self.period_ms {
            config.sample_period_ms = period_ms;
        }
        if let Some(store) = self.store {
            config.store_mode = store.into();
        }
        if self.reset_on_read {
            config.read_policy = ReadPolicy::ResetOnRead;
        }
    }
}

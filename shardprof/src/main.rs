//! # shardprof - Main Entry Point
//!
//! Starts the profiler with one shard per worker thread, drives a synthetic
//! CPU workload on those shards, then collects a cluster profile, prints the
//! hottest frames and optionally exports the profile.

// Main function is intentionally long for clarity; percentages lose precision for display
#![allow(clippy::too_many_lines, clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::time::{Duration, Instant};

use shardprof::analysis::analyze_hotspots;
use shardprof::cli::Args;
use shardprof::config::ProfilerConfig;
use shardprof::domain::{FrameId, ProfilerError};
use shardprof::export::{ExportFormat, ProfileExporter};
use shardprof::profile_data::ClusterProfile;
use shardprof::workload::{frame_name, Workload, WorkloadOptions};
use shardprof::Profiler;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

/// Bad configuration is a usage error; everything else is a runtime error.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    let invalid_config = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ProfilerError>(),
            Some(
                ProfilerError::InvalidSamplePeriod(_)
                    | ProfilerError::InvalidCapacity(_)
                    | ProfilerError::Json(_)
            )
        )
    });
    if invalid_config {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn load_config(args: &Args) -> Result<ProfilerConfig> {
    let mut config = match &args.config {
        Some(path) => ProfilerConfig::from_file(path)?,
        None => ProfilerConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn describe_frame(frame: FrameId) -> String {
    match frame_name(frame) {
        Some(name) => format!("{name} ({frame})"),
        None => frame.to_string(),
    }
}

fn print_summary(profile: &ClusterProfile, top: usize) {
    for shard in &profile.shards {
        eprintln!(
            "  {}: {} samples over {:.2}s ({} ticks, {} failed, {} dropped), {} distinct stacks",
            shard.shard_id,
            shard.total_count(),
            shard.window_nanos() as f64 / 1e9,
            shard.samples_taken,
            shard.failed_captures,
            shard.dropped_samples,
            shard.samples.len(),
        );
    }
    for diagnostic in &profile.diagnostics {
        eprintln!("  {} omitted: {}", diagnostic.shard_id, diagnostic.reason);
    }

    let hotspots = analyze_hotspots(profile);
    if hotspots.is_empty() {
        eprintln!("\nno samples captured");
        return;
    }

    eprintln!("\nhotspots:");
    for hotspot in hotspots.iter().take(top) {
        let shards: Vec<String> = hotspot.shards.keys().map(|s| s.0.to_string()).collect();
        eprintln!(
            "  {:>5.1}%  {:>6}  {}  shards {}",
            hotspot.percentage,
            hotspot.count,
            describe_frame(hotspot.frame),
            shards.join(","),
        );
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let config = load_config(&args)?;
    let profiler = Profiler::start(config).context("Failed to start profiler")?;

    if !quiet {
        let config = profiler.config();
        println!("shardprof v{}", env!("CARGO_PKG_VERSION"));
        println!("shards: {}", profiler.shard_count());
        println!("sampling: every {}ms ({:?} store)", config.sample_period_ms, config.store_mode);
        if let Some(ref export_path) = args.export {
            println!("export: {}", export_path.display());
        }
    }

    let workload = Workload::spawn(&profiler.contexts(), WorkloadOptions::default())?;

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let profiling_start = Instant::now();
    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };

    // Track why we exited the loop
    let mut exit_reason = "interrupted";

    loop {
        if let Some(limit) = duration_limit {
            if profiling_start.elapsed() >= limit {
                exit_reason = "duration limit reached";
                break;
            }
        }

        if let Some(target) = args.progress {
            if workload.progress() >= target {
                exit_reason = "progress target reached";
                break;
            }
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(100)) => {
                // Continue loop
            }
            _ = &mut ctrl_c => {
                break;
            }
        }
    }

    // Joining the workload threads blocks; keep it off the runtime threads
    let batches = tokio::task::spawn_blocking(move || workload.stop())
        .await
        .context("Workload shutdown failed")?;

    let profile = profiler.collect_all().await.context("Failed to collect profiles")?;
    if profile.is_partial() {
        warn!("{} shards missing from the profile", profile.diagnostics.len());
    }

    if !quiet {
        eprintln!(
            "\n{}: {:.1}s, {} batches, {} samples from {} shards",
            exit_reason,
            profiling_start.elapsed().as_secs_f64(),
            batches,
            profile.total_count(),
            profile.shards.len(),
        );
        print_summary(&profile, args.top);
    }

    if let Some(ref export_path) = args.export {
        let exporter = ProfileExporter::new(ExportFormat::from_path(export_path));
        exporter.export_to_file(&profile, export_path).context("Failed to export profile")?;
        if !quiet {
            println!("saved: {}", export_path.display());
        }
    }

    profiler.shutdown().await;
    info!("Done");
    Ok(())
}

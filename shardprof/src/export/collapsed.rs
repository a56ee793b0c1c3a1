//! Collapsed-stack export
//!
//! ```text
//! # Shard#0 period=10ms samples=42
//! 0x1000;0x1100;0x1110 30
//! 0x1000;0x1200 12
//! ```
//!
//! Frames run outermost to innermost. The aggregate-mode overflow bucket has
//! no frames and is written as [`OVERFLOW_FRAME`].

use std::io::Write;

use crate::domain::ExportError;
use crate::profile_data::ClusterProfile;

pub const OVERFLOW_FRAME: &str = "[overflow]";

/// # Errors
/// Returns an error if the write fails.
pub fn write_profile<W: Write>(profile: &ClusterProfile, mut writer: W) -> Result<(), ExportError> {
    for shard in &profile.shards {
        writeln!(
            writer,
            "# {} period={}ms samples={}",
            shard.shard_id,
            shard.sample_period_ms,
            shard.total_count()
        )?;
        for entry in &shard.samples {
            if entry.stack.is_empty() {
                writeln!(writer, "{OVERFLOW_FRAME} {}", entry.count)?;
            } else {
                writeln!(writer, "{} {}", entry.stack, entry.count)?;
            }
        }
    }
    for diagnostic in &profile.diagnostics {
        writeln!(writer, "# {} omitted: {}", diagnostic.shard_id, diagnostic.reason)?;
    }
    Ok(())
}

//! Profile export
//!
//! Writes a [`ClusterProfile`] to any `io::Write` in one of two formats:
//!
//! - **JSON**: the serde form of the profile, for the admin layer and tools
//! - **Collapsed**: `frame;frame;frame count` lines, one section per shard,
//!   the input format of common flamegraph generators
//!
//! Frames are written as hex ids; symbolization is left to the consumer.

pub mod collapsed;
pub mod json;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use log::info;

use crate::domain::ExportError;
use crate::profile_data::ClusterProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Collapsed,
}

impl ExportFormat {
    /// Pick a format from a file extension: `.folded`, `.collapsed` and
    /// `.txt` are collapsed stacks, everything else is JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("folded" | "collapsed" | "txt") => Self::Collapsed,
            _ => Self::Json,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "collapsed" | "folded" => Ok(Self::Collapsed),
            other => Err(ExportError::SerializationFailed(format!("unknown format '{other}'"))),
        }
    }
}

/// Writes cluster profiles in a fixed format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileExporter {
    format: ExportFormat,
}

impl ProfileExporter {
    #[must_use]
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    #[must_use]
    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// Write `profile` to `writer`.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn export<W: Write>(&self, profile: &ClusterProfile, writer: W) -> Result<(), ExportError> {
        match self.format {
            ExportFormat::Json => json::write_profile(profile, writer),
            ExportFormat::Collapsed => collapsed::write_profile(profile, writer),
        }
    }

    /// Write `profile` to a new file at `path`, replacing any existing one.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn export_to_file(&self, profile: &ClusterProfile, path: &Path) -> Result<(), ExportError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.export(profile, &mut writer)?;
        writer.flush()?;
        info!("Exported {} shard profiles to {}", profile.shards.len(), path.display());
        Ok(())
    }
}

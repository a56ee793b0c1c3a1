//! JSON export

use std::io::Write;

use crate::domain::ExportError;
use crate::profile_data::ClusterProfile;

/// Pretty-printed JSON, newline terminated.
///
/// # Errors
/// Returns an error if serialization or the write fails.
pub fn write_profile<W: Write>(profile: &ClusterProfile, mut writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut writer, profile)?;
    writeln!(writer)?;
    Ok(())
}

//! Lossless merge of a manifest of files with the concat demuxer.

use std::path::Path;

use splice_core::{Error, Result};

use super::{stage_error, GLOBAL_ARGS};
use crate::tools::ToolRegistry;

/// Merge the files listed in `manifest` (`file '<path>'` per line) into
/// `output` with stream copy.
///
/// # Errors
///
/// [`Error::Concatenation`] with ffmpeg's stderr when the tool fails.
pub async fn concat_manifest(tools: &ToolRegistry, manifest: &Path, output: &Path) -> Result<()> {
    let mut cmd = tools.command("ffmpeg")?;
    cmd.args(GLOBAL_ARGS);
    cmd.args(["-f", "concat", "-safe", "0", "-i"]);
    cmd.arg(manifest.to_string_lossy().as_ref());
    cmd.args(["-c", "copy"]);
    cmd.arg(output.to_string_lossy().as_ref());

    tracing::debug!(manifest = %manifest.display(), output = %output.display(), "concat");
    cmd.execute()
        .await
        .map_err(|e| stage_error(e, Error::Concatenation))?;
    Ok(())
}

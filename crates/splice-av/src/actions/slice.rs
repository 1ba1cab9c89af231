//! Lossless extraction of one time range with `-c copy`.

use std::path::Path;

use splice_core::{Error, Result, TimeRange};

use super::{stage_error, GLOBAL_ARGS};
use crate::tools::ToolRegistry;

/// Copy `range` of `source` into `output` without re-encoding.
///
/// `-avoid_negative_ts 1` shifts the slice so it starts at time zero.
///
/// # Errors
///
/// [`Error::Extraction`] with the range and ffmpeg's stderr when the tool
/// fails.
pub async fn extract_slice(
    tools: &ToolRegistry,
    source: &Path,
    range: &TimeRange,
    output: &Path,
) -> Result<()> {
    let mut cmd = tools.command("ffmpeg")?;
    cmd.args(slice_args(source, range, output));

    tracing::debug!(source = %source.display(), %range, output = %output.display(), "extract slice");
    cmd.execute()
        .await
        .map_err(|e| stage_error(e, |msg| Error::extraction(range.to_string(), msg)))?;
    Ok(())
}

fn slice_args(source: &Path, range: &TimeRange, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = GLOBAL_ARGS.iter().map(|s| s.to_string()).collect();
    args.push("-ss".into());
    args.push(range.start_arg());
    if let Some(end) = range.end_arg() {
        args.push("-to".into());
        args.push(end);
    }
    args.push("-i".into());
    args.push(source.to_string_lossy().to_string());
    args.extend(["-c", "copy", "-avoid_negative_ts", "1"].map(String::from));
    args.push(output.to_string_lossy().to_string());
    args
}

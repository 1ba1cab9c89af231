//! Single-pass stitching with `-filter_complex`.

use std::path::{Path, PathBuf};

use splice_core::{Error, Result};

use super::{stage_error, GLOBAL_ARGS};
use crate::tools::ToolRegistry;

/// Label of the joined audio stream the graph must produce.
pub const OUTPUT_LABEL: &str = "outaudio";

/// Run `graph` over `inputs` (in input-index order) and write the
/// `[outaudio]` stream to `output`. The audio is re-encoded once.
///
/// # Errors
///
/// [`Error::FilterGraph`] with ffmpeg's stderr when the tool fails.
pub async fn run_filter_graph(
    tools: &ToolRegistry,
    inputs: &[PathBuf],
    graph: &str,
    output: &Path,
) -> Result<()> {
    let mut cmd = tools.command("ffmpeg")?;
    cmd.args(filter_graph_args(inputs, graph, output));

    tracing::debug!(inputs = inputs.len(), graph, output = %output.display(), "filter graph");
    cmd.execute()
        .await
        .map_err(|e| stage_error(e, Error::FilterGraph))?;
    Ok(())
}

fn filter_graph_args(inputs: &[PathBuf], graph: &str, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = GLOBAL_ARGS.iter().map(|s| s.to_string()).collect();
    for input in inputs {
        args.push("-i".into());
        args.push(input.to_string_lossy().to_string());
    }
    args.push("-filter_complex".into());
    args.push(graph.to_string());
    args.push("-map".into());
    args.push(format!("[{OUTPUT_LABEL}]"));
    args.push(output.to_string_lossy().to_string());
    args
}

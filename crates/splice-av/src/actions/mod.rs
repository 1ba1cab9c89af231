//! ffmpeg invocations: lossless slice extraction, concat-demuxer merge and
//! single-pass filter-graph stitching.

mod concat;
mod filter_graph;
mod slice;

pub use concat::concat_manifest;
pub use filter_graph::{run_filter_graph, OUTPUT_LABEL};
pub use slice::extract_slice;

/// Arguments placed before every ffmpeg invocation: no progress output,
/// overwrite, errors only on stderr.
pub(crate) const GLOBAL_ARGS: [&str; 5] = ["-nostats", "-y", "-hide_banner", "-v", "error"];

/// Map a failed tool run into a stage-specific error, keeping the tool's
/// message (which carries its stderr).
pub(crate) fn stage_error(
    err: splice_core::Error,
    wrap: impl FnOnce(String) -> splice_core::Error,
) -> splice_core::Error {
    match err {
        splice_core::Error::Tool { tool, message } => wrap(format!("{tool}: {message}")),
        other => other,
    }
}

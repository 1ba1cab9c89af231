//! Unified error type for splicer.
//!
//! Every crate funnels its failures into [`Error`]. Variants map one-to-one
//! onto the stages of a stitch job so callers can tell a bad request
//! ([`Error::Validation`]) from a broken input file ([`Error::MediaProbe`])
//! or a failed tool run ([`Error::Extraction`], [`Error::Concatenation`],
//! [`Error::FilterGraph`]).

/// Unified error type covering all failure modes in splicer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The duration (or another required property) of a media file could not
    /// be determined.
    #[error("Probe error: {0}")]
    MediaProbe(String),

    /// Request data failed validation (empty marker list, overlapping or
    /// out-of-bounds regions, non-monotonic markers, missing clip source).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Lossless extraction of a slice of the original track failed.
    #[error("Extraction error [{range}]: {message}")]
    Extraction {
        /// The time range that was being extracted, e.g. `5.000-40.000`.
        range: String,
        /// Tool diagnostics.
        message: String,
    },

    /// The manifest-driven concat step failed.
    #[error("Concatenation error: {0}")]
    Concatenation(String),

    /// The single-pass filter graph invocation failed.
    #[error("Filter graph error: {0}")]
    FilterGraph(String),

    /// The filter-graph strategy was given a source that is not a stable,
    /// local file (or the fingerprint was asked to cover a third-party clip).
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    /// Retrieving a remote source failed.
    #[error("Fetch error [{url}]: {message}")]
    Fetch {
        /// The URL that was requested.
        url: String,
        /// Human-readable error description.
        message: String,
    },

    /// The stitched output is not as long as its plan and clips add up to.
    #[error("Duration mismatch: expected {expected_ms} ms, got {actual_ms} ms")]
    DurationMismatch {
        /// Retained track time plus the duration of every inserted clip.
        expected_ms: u64,
        /// Measured duration of the output.
        actual_ms: u64,
    },

    /// Reading from or publishing to the artifact store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An external tool (ffmpeg, ffprobe) could not be run or timed out.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The job was cancelled before it finished.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Configuration could not be parsed or is unusable.
    #[error("Config error: {0}")]
    Config(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Extraction`].
    pub fn extraction(range: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Extraction {
            range: range.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Fetch`].
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Short, stable name of the error kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MediaProbe(_) => "media_probe",
            Error::Validation(_) => "validation",
            Error::Extraction { .. } => "extraction",
            Error::Concatenation(_) => "concatenation",
            Error::FilterGraph(_) => "filter_graph",
            Error::UnsupportedSource(_) => "unsupported_source",
            Error::Fetch { .. } => "fetch",
            Error::DurationMismatch { .. } => "duration_mismatch",
            Error::Storage(_) => "storage",
            Error::Tool { .. } => "tool",
            Error::Io { .. } => "io",
            Error::Cancelled(_) => "cancelled",
            Error::Config(_) => "config",
            Error::Internal(_) => "internal",
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

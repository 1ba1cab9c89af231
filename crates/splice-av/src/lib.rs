//! # splice-av
//!
//! External tool plumbing for the splicer pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for running external processes.
//! - **Probing** ([`probe::FfprobeProber`]) -- duration, channels, sample rate
//!   and bitrate of an audio file.
//! - **Actions** ([`actions`]) -- lossless slice extraction, concat-demuxer
//!   merge and single-pass filter-graph stitching.
//! - **Backend** ([`MediaBackend`], [`FfmpegBackend`]) -- the capability
//!   interface the pipeline depends on.
//! - **Temp handling** ([`JobScope`], [`TempResources`]) -- job-scoped file
//!   naming and guaranteed cleanup.

pub mod actions;
pub mod backend;
pub mod command;
pub mod probe;
pub mod temp;
pub mod tools;

// ---- Re-exports for convenience ----

pub use backend::{FfmpegBackend, MediaBackend};
pub use command::{ToolCommand, ToolOutput};
pub use probe::{AudioInfo, FfprobeProber};
pub use temp::{JobScope, ReleaseStats, TempResources};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};

//! # splice-pipeline
//!
//! Planning and execution of splice jobs.
//!
//! This crate provides:
//!
//! - **[`SegmentPlanner`]** -- turns markers and a track duration into an
//!   ordered [`Plan`] of slices and clips.
//! - **[`Stitcher`]** implementations -- [`ConcatDemuxerStitcher`] (slice,
//!   then lossless concat) and [`FilterGraphStitcher`] (one re-encoding pass).
//! - **[`ContentHashCache`]** -- fingerprint-keyed, single-flight artifact
//!   cache over an [`ArtifactStore`].
//! - **[`JobRunner`]** -- runs one job end to end and releases every temp
//!   file it created.

pub mod cache;
pub mod concat;
pub mod extract;
pub mod filter_graph;
pub mod job;
pub mod plan;
pub mod planner;
pub mod resolve;
pub mod stitcher;
pub mod store;

pub use cache::{fingerprint, storage_key, CacheKey, ContentHashCache, Fingerprint};
pub use concat::{build_manifest, ConcatDemuxerStitcher};
pub use extract::SliceExtractor;
pub use filter_graph::{FilterGraph, FilterGraphStitcher};
pub use job::{DryRun, JobOutcome, JobRunner, StitchJob, StitchRequest};
pub use plan::{Plan, PlanClip, PlanItem};
pub use planner::SegmentPlanner;
pub use resolve::{
    resolve_sources, LocalResolver, Resolved, ResolvedSources, SourceResolver, SourceStamp,
};
pub use stitcher::{stitcher_for, StitchContext, StitchOutput, Stitcher};
pub use store::{ArtifactMeta, ArtifactRef, ArtifactStore, LocalDirStore};

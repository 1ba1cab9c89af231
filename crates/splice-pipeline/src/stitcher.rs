//! The [`Stitcher`] trait and strategy selection.
//!
//! A stitcher turns a [`Plan`] into one output file. Both implementations
//! follow the same contract: `validate` checks preconditions before any tool
//! runs, `stitch` writes `ctx.output`, measures it, and removes everything
//! else it created whether or not it succeeds.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use splice_av::{JobScope, MediaBackend};
use splice_core::{Error, Result, Strategy, Track};
use tokio_util::sync::CancellationToken;

use crate::concat::ConcatDemuxerStitcher;
use crate::filter_graph::FilterGraphStitcher;
use crate::plan::Plan;

/// The stitched file and its measured duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StitchOutput {
    pub path: PathBuf,
    pub duration_ms: u64,
}

/// Everything a stitcher needs for one attempt.
pub struct StitchContext {
    pub backend: Arc<dyn MediaBackend>,
    pub scope: JobScope,
    pub track: Track,
    pub plan: Plan,
    /// Where the stitched file is written.
    pub output: PathBuf,
    /// Checked between tool runs; when cancelled the stitcher stops early.
    pub cancellation: CancellationToken,
}

impl StitchContext {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        scope: JobScope,
        track: Track,
        plan: Plan,
        output: PathBuf,
    ) -> Self {
        Self {
            backend,
            scope,
            track,
            plan,
            output,
            cancellation: CancellationToken::new(),
        }
    }

    /// Builder: attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Fail with [`Error::Cancelled`] if the job was cancelled.
    pub fn check_cancelled(&self, step: &str) -> Result<()> {
        if self.cancellation.is_cancelled() {
            tracing::info!(step, "stitch cancelled");
            return Err(Error::Cancelled(format!("cancelled before {step}")));
        }
        Ok(())
    }

    /// Remove a partially written output after a failure.
    pub(crate) async fn discard_output(&self) {
        match tokio::fs::remove_file(&self.output).await {
            Ok(()) => tracing::debug!(path = %self.output.display(), "removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.output.display(), error = %e, "failed to remove partial output"),
        }
    }

    /// Probe the finished output.
    pub(crate) async fn measure_output(&self) -> Result<StitchOutput> {
        let info = self.backend.probe(&self.output).await?;
        Ok(StitchOutput {
            path: self.output.clone(),
            duration_ms: info.duration_ms(),
        })
    }
}

impl std::fmt::Debug for StitchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StitchContext")
            .field("backend", &self.backend.name())
            .field("scope", &self.scope)
            .field("plan_items", &self.plan.len())
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// One way of turning a plan into a single file.
#[async_trait]
pub trait Stitcher: Send + Sync {
    /// A short, human-readable name for this strategy.
    fn name(&self) -> &'static str;

    /// Check preconditions before anything runs.
    async fn validate(&self, ctx: &StitchContext) -> Result<()>;

    /// Produce `ctx.output` and return it with its measured duration.
    async fn stitch(&self, ctx: &StitchContext) -> Result<StitchOutput>;
}

/// The stitcher implementing `strategy`.
pub fn stitcher_for(strategy: Strategy) -> Box<dyn Stitcher> {
    match strategy {
        Strategy::Concat => Box::new(ConcatDemuxerStitcher::new()),
        Strategy::FilterGraph => Box::new(FilterGraphStitcher::new()),
    }
}

/// Shared precondition of both strategies.
pub(crate) fn ensure_non_empty(plan: &Plan) -> Result<()> {
    if plan.is_empty() {
        return Err(Error::Validation(
            "nothing left to stitch: the plan is empty".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_selection() {
        assert_eq!(stitcher_for(Strategy::Concat).name(), "concat");
        assert_eq!(stitcher_for(Strategy::FilterGraph).name(), "filter-graph");
    }
}

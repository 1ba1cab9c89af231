//! Single-pass stitching: one trim-and-concat filter graph over the original
//! track and the clip files, re-encoded once, no intermediate files.

use std::path::PathBuf;

use async_trait::async_trait;
use splice_av::actions::OUTPUT_LABEL;
use splice_core::{ClipOrigin, Error, Result, SourceRef};

use crate::plan::{Plan, PlanItem};
use crate::stitcher::{ensure_non_empty, StitchContext, StitchOutput, Stitcher};

/// A filter graph expression and the inputs it refers to by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGraph {
    /// Input 0 is the original track; each distinct clip path follows once.
    pub inputs: Vec<PathBuf>,
    pub expression: String,
}

impl FilterGraph {
    /// Build the graph for `plan`.
    ///
    /// ```text
    /// [0:a]atrim=start=0.000:end=5.000,asetpts=PTS-STARTPTS[s0];
    /// [1:a]anull[c0];
    /// [0:a]atrim=start=5.000,asetpts=PTS-STARTPTS[s1];
    /// [s0][c0][s1]concat=n=3:v=0:a=1[outaudio]
    /// ```
    pub fn from_plan(plan: &Plan) -> Self {
        let mut inputs = vec![plan.track_path.clone()];
        let mut filters = Vec::with_capacity(plan.len() + 1);
        let mut taps = String::new();
        let (mut slices, mut clips) = (0usize, 0usize);

        for item in &plan.items {
            match item {
                PlanItem::Slice(range) => {
                    let mut trim = format!("start={}", range.start_arg());
                    if let Some(end) = range.end_arg() {
                        trim.push_str(&format!(":end={end}"));
                    }
                    let tap = format!("s{slices}");
                    filters.push(format!("[0:a]atrim={trim},asetpts=PTS-STARTPTS[{tap}]"));
                    taps.push_str(&format!("[{tap}]"));
                    slices += 1;
                }
                PlanItem::Clip(clip) => {
                    let index = match inputs.iter().position(|p| p == &clip.path) {
                        Some(i) => i,
                        None => {
                            inputs.push(clip.path.clone());
                            inputs.len() - 1
                        }
                    };
                    let tap = format!("c{clips}");
                    filters.push(format!("[{index}:a]anull[{tap}]"));
                    taps.push_str(&format!("[{tap}]"));
                    clips += 1;
                }
            }
        }

        filters.push(format!(
            "{taps}concat=n={}:v=0:a=1[{OUTPUT_LABEL}]",
            slices + clips
        ));

        Self {
            inputs,
            expression: filters.join(";"),
        }
    }
}

/// Filter-graph stitcher. Requires stable, local sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterGraphStitcher;

impl FilterGraphStitcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stitcher for FilterGraphStitcher {
    fn name(&self) -> &'static str {
        "filter-graph"
    }

    async fn validate(&self, ctx: &StitchContext) -> Result<()> {
        ensure_non_empty(&ctx.plan)?;

        if let SourceRef::Remote(url) = &ctx.track.location {
            return Err(Error::UnsupportedSource(format!(
                "track {url} is not a local file"
            )));
        }
        if !ctx.plan.track_path.is_file() {
            return Err(Error::UnsupportedSource(format!(
                "track {} does not exist",
                ctx.plan.track_path.display()
            )));
        }

        for clip in ctx.plan.clips() {
            if clip.origin != ClipOrigin::Static {
                return Err(Error::UnsupportedSource(format!(
                    "clip {} is {} and can not be stitched in one pass",
                    clip.id, clip.origin
                )));
            }
            if clip.source.is_remote() {
                return Err(Error::UnsupportedSource(format!(
                    "clip {} ({}) is not a local file",
                    clip.id, clip.source
                )));
            }
            if !clip.path.is_file() {
                return Err(Error::UnsupportedSource(format!(
                    "clip {} file {} does not exist",
                    clip.id,
                    clip.path.display()
                )));
            }
        }
        Ok(())
    }

    async fn stitch(&self, ctx: &StitchContext) -> Result<StitchOutput> {
        ctx.check_cancelled("filter graph")?;
        let graph = FilterGraph::from_plan(&ctx.plan);

        if let Err(e) = ctx
            .backend
            .filter_graph_stitch(&graph.inputs, &graph.expression, &ctx.output)
            .await
        {
            tracing::error!(error = %e, kind = e.kind(), "filter graph stitch failed");
            ctx.discard_output().await;
            return Err(e);
        }

        ctx.measure_output().await
    }
}

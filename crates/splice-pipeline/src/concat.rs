//! Lossless stitching: extract every slice, then merge with the concat
//! demuxer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use splice_av::TempResources;
use splice_core::Result;

use crate::extract::SliceExtractor;
use crate::plan::PlanItem;
use crate::stitcher::{ensure_non_empty, StitchContext, StitchOutput, Stitcher};

/// Slice-and-concatenate stitcher. No re-encoding happens.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatDemuxerStitcher;

impl ConcatDemuxerStitcher {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, ctx: &StitchContext, attempt: &TempResources) -> Result<()> {
        let extractor = SliceExtractor::new(ctx.backend.clone());
        let mut components: Vec<PathBuf> = Vec::with_capacity(ctx.plan.len());

        for item in &ctx.plan.items {
            match item {
                PlanItem::Slice(range) => {
                    ctx.check_cancelled("slice extraction")?;
                    let path = extractor
                        .extract(&ctx.scope, attempt, &ctx.plan.track_path, range)
                        .await?;
                    components.push(path);
                }
                PlanItem::Clip(clip) => components.push(clip.path.clone()),
            }
        }

        let manifest = ctx.scope.file("manifest", "txt");
        attempt.register(&manifest);
        tokio::fs::write(&manifest, build_manifest(&components)?).await?;

        ctx.check_cancelled("concatenation")?;
        ctx.backend.concatenate(&manifest, &ctx.output).await
    }
}

#[async_trait]
impl Stitcher for ConcatDemuxerStitcher {
    fn name(&self) -> &'static str {
        "concat"
    }

    async fn validate(&self, ctx: &StitchContext) -> Result<()> {
        ensure_non_empty(&ctx.plan)
    }

    async fn stitch(&self, ctx: &StitchContext) -> Result<StitchOutput> {
        let attempt = TempResources::new();
        let result = self.run(ctx, &attempt).await;
        let released = attempt.release_all();
        tracing::debug!(removed = released.removed, "concat intermediates released");

        if let Err(e) = result {
            tracing::error!(error = %e, kind = e.kind(), "concat stitch failed");
            ctx.discard_output().await;
            return Err(e);
        }

        ctx.measure_output().await
    }
}

/// Concat demuxer manifest: one `file '<absolute path>'` line per component,
/// in plan order.
pub fn build_manifest(components: &[PathBuf]) -> Result<String> {
    let mut manifest = String::new();
    for path in components {
        let absolute = std::path::absolute(path)?;
        manifest.push_str("file '");
        manifest.push_str(&escape_manifest_path(&absolute));
        manifest.push_str("'\n");
    }
    Ok(manifest)
}

/// Quote a path for a single-quoted manifest entry (`'` becomes `'\''`).
fn escape_manifest_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lists_components_in_order() {
        let manifest = build_manifest(&[
            PathBuf::from("/tmp/job-0.000-5.000.mp3"),
            PathBuf::from("/ads/a.mp3"),
            PathBuf::from("/tmp/job-5.000-end.mp3"),
        ])
        .unwrap();
        assert_eq!(
            manifest,
            "file '/tmp/job-0.000-5.000.mp3'\nfile '/ads/a.mp3'\nfile '/tmp/job-5.000-end.mp3'\n"
        );
    }

    #[test]
    fn manifest_escapes_single_quotes() {
        let manifest = build_manifest(&[PathBuf::from("/ads/rock'n'roll.mp3")]).unwrap();
        assert_eq!(manifest, "file '/ads/rock'\\''n'\\''roll.mp3'\n");
    }

    #[test]
    fn manifest_paths_are_absolute() {
        let manifest = build_manifest(&[PathBuf::from("relative/a.mp3")]).unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert!(manifest.starts_with(&format!("file '{}", cwd.display())));
    }
}

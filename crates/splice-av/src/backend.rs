//! The media capability interface the pipeline is written against.
//!
//! [`FfmpegBackend`] implements it with ffprobe/ffmpeg; tests substitute an
//! in-process fake.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use splice_core::{Error, Result, TimeRange};

use crate::actions;
use crate::probe::{AudioInfo, FfprobeProber};
use crate::tools::ToolRegistry;

/// Probe, extract, concatenate and filter-graph operations on audio files.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Human-readable backend name for logging.
    fn name(&self) -> &'static str;

    /// Measure `path`. Fails with [`Error::MediaProbe`].
    async fn probe(&self, path: &Path) -> Result<AudioInfo>;

    /// Losslessly copy `range` of `source` into `output`. Fails with
    /// [`Error::Extraction`].
    async fn extract_slice(&self, source: &Path, range: &TimeRange, output: &Path) -> Result<()>;

    /// Merge the files listed in `manifest` into `output`. Fails with
    /// [`Error::Concatenation`].
    async fn concatenate(&self, manifest: &Path, output: &Path) -> Result<()>;

    /// Run a filter graph over `inputs` and write its `[outaudio]` stream.
    /// Fails with [`Error::FilterGraph`].
    async fn filter_graph_stitch(
        &self,
        inputs: &[PathBuf],
        graph: &str,
        output: &Path,
    ) -> Result<()>;
}

/// [`MediaBackend`] backed by the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    tools: ToolRegistry,
}

impl FfmpegBackend {
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn prober(&self) -> Result<FfprobeProber> {
        let cfg = self
            .tools
            .require("ffprobe")
            .map_err(|e| Error::MediaProbe(e.to_string()))?;
        Ok(FfprobeProber::new(cfg.path.clone(), cfg.timeout))
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<AudioInfo> {
        self.prober()?.probe(path).await
    }

    async fn extract_slice(&self, source: &Path, range: &TimeRange, output: &Path) -> Result<()> {
        actions::extract_slice(&self.tools, source, range, output).await
    }

    async fn concatenate(&self, manifest: &Path, output: &Path) -> Result<()> {
        actions::concat_manifest(&self.tools, manifest, output).await
    }

    async fn filter_graph_stitch(
        &self,
        inputs: &[PathBuf],
        graph: &str,
        output: &Path,
    ) -> Result<()> {
        actions::run_filter_graph(&self.tools, inputs, graph, output).await
    }
}

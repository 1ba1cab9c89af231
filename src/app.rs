//! Wiring: builds the job runner and its capabilities from a [`Config`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use splice_av::{FfmpegBackend, MediaBackend, ToolRegistry};
use splice_core::config::Config;
use splice_pipeline::{ContentHashCache, JobRunner, LocalDirStore};
use tokio_util::sync::CancellationToken;

use crate::fetch::HttpFetcher;

/// Directory used for job temp files.
pub fn temp_dir(config: &Config) -> PathBuf {
    config
        .workspace
        .temp_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("splicer"))
}

/// A configured application instance.
pub struct App {
    pub config: Config,
    pub tools: ToolRegistry,
    runner: JobRunner,
}

impl App {
    /// Build with the ffmpeg backend discovered from `config.tools`.
    pub fn new(config: Config, cancellation: CancellationToken) -> Result<Self> {
        let tools = ToolRegistry::discover(&config.tools);
        let backend = Arc::new(FfmpegBackend::new(tools.clone()));
        let runner = build_runner(&config, backend, cancellation)?;
        Ok(Self {
            config,
            tools,
            runner,
        })
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }
}

/// Assemble a [`JobRunner`] over `backend`.
pub fn build_runner(
    config: &Config,
    backend: Arc<dyn MediaBackend>,
    cancellation: CancellationToken,
) -> Result<JobRunner> {
    let temp_dir = temp_dir(config);
    std::fs::create_dir_all(&temp_dir)
        .with_context(|| format!("Failed to create temp dir {:?}", temp_dir))?;

    let fetcher = HttpFetcher::new(&config.fetch).context("Failed to set up HTTP retrieval")?;
    let store = Arc::new(LocalDirStore::new(config.cache.root.clone()));
    let cache = Arc::new(ContentHashCache::new(store, config.cache.key_prefix.clone()));

    tracing::debug!(
        backend = backend.name(),
        temp_dir = %temp_dir.display(),
        store = %config.cache.root.display(),
        cache_enabled = config.cache.enabled,
        "runner configured"
    );

    Ok(JobRunner::new(backend, Arc::new(fetcher), cache, temp_dir)
        .with_output_extension(config.stitch.output_extension.clone())
        .with_job_timeout(config.stitch.job_timeout())
        .with_cache_enabled(config.cache.enabled)
        .with_duration_tolerance(config.stitch.duration_tolerance_ms)
        .with_strict_duration(config.stitch.strict_duration)
        .with_keep_output(config.workspace.keep_output)
        .with_cancellation(cancellation))
}

//! Stitch jobs and the runner that executes them end to end.
//!
//! One job is a strictly sequential pipeline:
//! resolve sources, probe the track, fingerprint, consult the cache and, on
//! a miss, plan, stitch, publish and populate. Every temp file the job
//! creates is released before [`JobRunner::run`] returns, whatever the
//! outcome.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use splice_av::{JobScope, MediaBackend, TempResources};
use splice_core::{
    ClipOrigin, Error, JobId, JobSpec, Marker, Mode, Result, Strategy, Track,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::{fingerprint, CacheKey, ContentHashCache, Fingerprint};
use crate::plan::Plan;
use crate::planner::SegmentPlanner;
use crate::resolve::{resolve_sources, ResolvedSources, SourceResolver};
use crate::stitcher::{stitcher_for, StitchContext, StitchOutput};
use crate::store::{ArtifactMeta, ArtifactRef};

/// What the caller asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StitchRequest {
    pub track: Track,
    pub mode: Mode,
    pub markers: Vec<Marker>,
    pub strategy: Strategy,
}

impl StitchRequest {
    pub fn new(track: Track, mode: Mode, markers: Vec<Marker>, strategy: Strategy) -> Self {
        Self {
            track,
            mode,
            markers,
            strategy,
        }
    }

    /// Build a request from a parsed job file.
    pub fn from_spec(spec: &JobSpec, strategy: Strategy) -> Result<Self> {
        Ok(Self::new(spec.track(), spec.mode, spec.markers()?, strategy))
    }

    /// Checks that need no I/O: markers present and all of the request mode.
    pub fn validate(&self) -> Result<()> {
        if self.markers.is_empty() {
            return Err(Error::Validation("segments can not be empty".into()));
        }
        if let Some(i) = self.markers.iter().position(|m| m.mode() != self.mode) {
            return Err(Error::Validation(format!(
                "segment {i} does not match {} mode",
                self.mode
            )));
        }
        Ok(())
    }

    /// Whether the result may be cached (no third-party clips).
    pub fn is_cacheable(&self) -> bool {
        self.markers
            .iter()
            .filter_map(Marker::clip)
            .all(|c| c.origin != ClipOrigin::ThirdParty)
    }
}

/// A request bound to a job id and, once measured, a fingerprint.
#[derive(Debug, Clone, Serialize)]
pub struct StitchJob {
    pub id: JobId,
    pub track: Track,
    pub markers: Vec<Marker>,
    pub mode: Mode,
    pub strategy: Strategy,
    pub fingerprint: Option<Fingerprint>,
    pub output: Option<StitchOutput>,
}

/// Result of a dry run: the job and the plan that would be stitched.
#[derive(Debug, Clone, Serialize)]
pub struct DryRun {
    pub job: StitchJob,
    pub track_duration_ms: u64,
    pub storage_key: String,
    /// Retained track time plus every inserted clip.
    pub expected_duration_ms: u64,
    pub plan: Plan,
}

/// Result of a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub key: String,
    pub location: PathBuf,
    pub duration_ms: Option<u64>,
    /// The artifact was served from the cache; nothing was stitched.
    pub cached: bool,
    pub fingerprint: Option<Fingerprint>,
    /// The stitched file left in the temp directory, when kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_output: Option<PathBuf>,
}

/// Executes stitch jobs against injected capabilities.
pub struct JobRunner {
    backend: Arc<dyn MediaBackend>,
    resolver: Arc<dyn SourceResolver>,
    cache: Arc<ContentHashCache>,
    temp_dir: PathBuf,
    output_extension: String,
    job_timeout: Option<Duration>,
    use_cache: bool,
    duration_tolerance_ms: u64,
    strict_duration: bool,
    keep_output: bool,
    cancellation: CancellationToken,
}

impl JobRunner {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        resolver: Arc<dyn SourceResolver>,
        cache: Arc<ContentHashCache>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            resolver,
            cache,
            temp_dir: temp_dir.into(),
            output_extension: "mp3".into(),
            job_timeout: None,
            use_cache: true,
            duration_tolerance_ms: 100,
            strict_duration: false,
            keep_output: false,
            cancellation: CancellationToken::new(),
        }
    }

    /// Builder: extension of the stitched file (without the dot).
    pub fn with_output_extension(mut self, ext: impl Into<String>) -> Self {
        self.output_extension = ext.into();
        self
    }

    /// Builder: wall-clock limit per job.
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Builder: turn cache lookups and population on or off.
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    /// Builder: allowed gap between expected and measured output duration.
    pub fn with_duration_tolerance(mut self, tolerance_ms: u64) -> Self {
        self.duration_tolerance_ms = tolerance_ms;
        self
    }

    /// Builder: fail jobs whose output duration is outside the tolerance
    /// instead of only warning.
    pub fn with_strict_duration(mut self, strict: bool) -> Self {
        self.strict_duration = strict;
        self
    }

    /// Builder: leave the stitched file of a fresh job in the temp directory.
    pub fn with_keep_output(mut self, keep: bool) -> Self {
        self.keep_output = keep;
        self
    }

    /// Builder: attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cache(&self) -> &Arc<ContentHashCache> {
        &self.cache
    }

    /// Run one job to completion.
    ///
    /// # Errors
    ///
    /// Any stage error. On error no artifact is published, the cache is not
    /// populated and no temp file of the job remains.
    pub async fn run(&self, request: &StitchRequest) -> Result<JobOutcome> {
        let scope = self.scope(request);
        let span = tracing::info_span!(
            "job",
            job_id = %scope.job_id.short(),
            track = %scope.label,
            fingerprint = tracing::field::Empty,
        );
        let resources = TempResources::new();

        let work = self.execute(request, &scope, &resources).instrument(span.clone());
        let result = match self.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => Err(Error::tool("job", format!("timed out after {limit:?}"))),
            },
            None => work.await,
        };

        let released = resources.release_all();
        span.in_scope(|| match &result {
            Ok(outcome) => tracing::info!(
                key = %outcome.key,
                cached = outcome.cached,
                duration_ms = ?outcome.duration_ms,
                released = released.removed,
                "job finished"
            ),
            Err(e) => tracing::error!(
                error = %e,
                kind = e.kind(),
                released = released.removed,
                "job failed"
            ),
        });
        result
    }

    /// Resolve, probe and plan without stitching.
    pub async fn plan_only(&self, request: &StitchRequest) -> Result<DryRun> {
        let scope = self.scope(request);
        let resources = TempResources::new();
        let span = tracing::info_span!("dry_run", job_id = %scope.job_id.short(), track = %scope.label);

        let result = async {
            request.validate()?;
            let (sources, duration_ms) = self.prepare(request, &scope, &resources).await?;
            let (fingerprint, storage_key) = self.storage_key(request, &scope, duration_ms)?;
            let plan = SegmentPlanner::new().plan(request.mode, &request.markers, &sources, duration_ms)?;
            let expected_duration_ms = self.expected_duration(&plan).await?;
            Ok(DryRun {
                job: StitchJob {
                    id: scope.job_id,
                    track: request.track.clone(),
                    markers: request.markers.clone(),
                    mode: request.mode,
                    strategy: request.strategy,
                    fingerprint: fingerprint.map(|k| k.fingerprint),
                    output: None,
                },
                track_duration_ms: duration_ms,
                storage_key,
                expected_duration_ms,
                plan,
            })
        }
        .instrument(span)
        .await;

        resources.release_all();
        result
    }

    fn scope(&self, request: &StitchRequest) -> JobScope {
        JobScope::new(JobId::new(), request.track.label(), &self.temp_dir)
    }

    fn check_cancelled(&self, step: &str) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled(format!("cancelled before {step}")));
        }
        Ok(())
    }

    async fn prepare(
        &self,
        request: &StitchRequest,
        scope: &JobScope,
        resources: &TempResources,
    ) -> Result<(ResolvedSources, u64)> {
        self.check_cancelled("resolving sources")?;
        let sources = resolve_sources(
            self.resolver.as_ref(),
            &request.track,
            &request.markers,
            scope,
            resources,
        )
        .await?;

        self.check_cancelled("probing")?;
        let info = self.backend.probe(&sources.track).await?;
        let duration_ms = info.duration_ms();
        tracing::info!(duration_ms, codec = ?info.codec, "track probed");
        if let Some(fresh_until) = sources.stamps.iter().map(|s| s.expires_at).min() {
            tracing::info!(downloaded = sources.stamps.len(), %fresh_until, "remote sources retrieved");
        }
        for stamp in &sources.stamps {
            tracing::debug!(
                location = %stamp.location,
                etag = ?stamp.etag,
                expires_at = %stamp.expires_at,
                "source stamp"
            );
        }
        Ok((sources, duration_ms))
    }

    /// Retained track time plus the duration of every inserted clip. Each
    /// distinct clip file is probed once.
    async fn expected_duration(&self, plan: &Plan) -> Result<u64> {
        let mut clip_ms: HashMap<&Path, u64> = HashMap::new();
        let mut total = plan.retained_ms();
        for clip in plan.clips() {
            let ms = match clip_ms.get(clip.path.as_path()) {
                Some(ms) => *ms,
                None => {
                    let ms = self.backend.probe(&clip.path).await?.duration_ms();
                    clip_ms.insert(clip.path.as_path(), ms);
                    ms
                }
            };
            total += ms;
        }
        Ok(total)
    }

    fn check_duration(&self, expected_ms: u64, actual_ms: u64) -> Result<()> {
        let drift_ms = expected_ms.abs_diff(actual_ms);
        if drift_ms <= self.duration_tolerance_ms {
            tracing::debug!(expected_ms, actual_ms, "output duration within tolerance");
            return Ok(());
        }
        if self.strict_duration {
            return Err(Error::DurationMismatch {
                expected_ms,
                actual_ms,
            });
        }
        tracing::warn!(
            expected_ms,
            actual_ms,
            drift_ms,
            tolerance_ms = self.duration_tolerance_ms,
            "output duration differs from plan"
        );
        Ok(())
    }

    /// The cache key when the job is cacheable, and the storage key the
    /// artifact is published under.
    fn storage_key(
        &self,
        request: &StitchRequest,
        scope: &JobScope,
        duration_ms: u64,
    ) -> Result<(Option<CacheKey>, String)> {
        if self.use_cache && request.is_cacheable() {
            let fp = fingerprint(&request.track, duration_ms, request.mode, &request.markers)?;
            let key = self.cache.key_for(&request.track, fp, &self.output_extension);
            let storage_key = key.storage_key.clone();
            return Ok((Some(key), storage_key));
        }

        let prefix = self.cache.key_prefix().trim_matches('/');
        let name = format!(
            "{}-{}.{}",
            scope.label,
            scope.job_id.as_uuid().simple(),
            self.output_extension
        );
        let storage_key = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        Ok((None, storage_key))
    }

    async fn execute(
        &self,
        request: &StitchRequest,
        scope: &JobScope,
        resources: &TempResources,
    ) -> Result<JobOutcome> {
        request.validate()?;
        tracing::info!(
            mode = %request.mode,
            strategy = %request.strategy,
            markers = request.markers.len(),
            "job started"
        );

        let (sources, duration_ms) = self.prepare(request, scope, resources).await?;
        let (cache_key, storage_key) = self.storage_key(request, scope, duration_ms)?;

        let produce = || self.produce(request, scope, resources, &sources, duration_ms, &storage_key, cache_key.as_ref());
        let (artifact, cached) = match &cache_key {
            Some(key) => {
                tracing::Span::current().record("fingerprint", key.fingerprint.short());
                self.cache.get_or_compute(key, produce).await?
            }
            None => {
                if !request.is_cacheable() {
                    tracing::info!("third-party clip present; bypassing cache");
                }
                (produce().await?, false)
            }
        };

        if cached {
            tracing::info!(key = %artifact.key, "served from cache");
        }

        let local_output = if self.keep_output && !cached {
            let output = scope.file("stitched", &self.output_extension);
            resources.keep(&output).then_some(output)
        } else {
            None
        };

        Ok(JobOutcome {
            job_id: scope.job_id,
            key: artifact.key,
            location: artifact.location,
            duration_ms: artifact.duration_ms,
            cached,
            fingerprint: cache_key.map(|k| k.fingerprint),
            local_output,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn produce(
        &self,
        request: &StitchRequest,
        scope: &JobScope,
        resources: &TempResources,
        sources: &ResolvedSources,
        duration_ms: u64,
        storage_key: &str,
        cache_key: Option<&CacheKey>,
    ) -> Result<ArtifactRef> {
        let plan = SegmentPlanner::new().plan(request.mode, &request.markers, sources, duration_ms)?;
        let expected_ms = self.expected_duration(&plan).await?;
        let stitcher = stitcher_for(request.strategy);

        let output = scope.file("stitched", &self.output_extension);
        resources.register(&output);

        let ctx = StitchContext::new(
            self.backend.clone(),
            scope.clone(),
            request.track.clone(),
            plan,
            output,
        )
        .with_cancellation(self.cancellation.clone());

        stitcher.validate(&ctx).await?;
        tracing::info!(
            stitcher = stitcher.name(),
            items = ctx.plan.len(),
            retained_ms = ctx.plan.retained_ms(),
            expected_ms,
            "stitching"
        );
        let stitched = stitcher.stitch(&ctx).await?;
        tracing::info!(duration_ms = stitched.duration_ms, "stitched");
        self.check_duration(expected_ms, stitched.duration_ms)?;

        self.check_cancelled("publishing")?;
        let meta = ArtifactMeta {
            duration_ms: stitched.duration_ms,
            fingerprint: cache_key.map(|k| k.fingerprint.to_string()),
            track_label: scope.label.clone(),
            strategy: stitcher.name().to_string(),
            created_at: Utc::now(),
            sources: sources.stamps.clone(),
        };
        self.cache.store().put(&stitched.path, storage_key, &meta).await
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("backend", &self.backend.name())
            .field("resolver", &self.resolver.name())
            .field("cache", &self.cache)
            .field("temp_dir", &self.temp_dir)
            .field("output_extension", &self.output_extension)
            .field("job_timeout", &self.job_timeout)
            .field("use_cache", &self.use_cache)
            .field("duration_tolerance_ms", &self.duration_tolerance_ms)
            .field("strict_duration", &self.strict_duration)
            .field("keep_output", &self.keep_output)
            .finish()
    }
}

//! Turning track and clip locations into local files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use splice_av::{JobScope, TempResources};
use splice_core::{ClipRef, Error, Marker, Result, SourceRef, Track};

/// Validator and freshness the origin reported for a downloaded source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStamp {
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// A source made available as a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: PathBuf,
    /// Set for downloaded copies.
    pub stamp: Option<SourceStamp>,
}

impl Resolved {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stamp: None,
        }
    }
}

/// Makes a [`SourceRef`] available as a local file.
///
/// Implementations that download must write into `scope.temp_dir` and
/// register what they write with `resources`.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(
        &self,
        source: &SourceRef,
        scope: &JobScope,
        resources: &TempResources,
    ) -> Result<Resolved>;
}

/// Resolver for local paths only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalResolver;

#[async_trait]
impl SourceResolver for LocalResolver {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn resolve(
        &self,
        source: &SourceRef,
        _scope: &JobScope,
        _resources: &TempResources,
    ) -> Result<Resolved> {
        match source {
            SourceRef::Local(path) => Ok(Resolved::local(path.clone())),
            SourceRef::Remote(url) => Err(Error::Validation(format!(
                "no retrieval configured for remote source {url}"
            ))),
        }
    }
}

/// Local files for the track and every distinct clip location of a job.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSources {
    pub track: PathBuf,
    pub clips: HashMap<SourceRef, PathBuf>,
    /// Stamps of every downloaded source, track first.
    pub stamps: Vec<SourceStamp>,
}

impl ResolvedSources {
    pub fn clip_path(&self, clip: &ClipRef) -> Option<&Path> {
        self.clips.get(&clip.location).map(PathBuf::as_path)
    }
}

/// Resolve the track and all clip locations, each distinct location once.
///
/// The track file is not checked here; probing reports a missing track. A
/// clip that does not resolve to an existing file is a validation error.
/// Resolver failures, such as a failed download, are returned as they are.
pub async fn resolve_sources(
    resolver: &dyn SourceResolver,
    track: &Track,
    markers: &[Marker],
    scope: &JobScope,
    resources: &TempResources,
) -> Result<ResolvedSources> {
    let resolved = resolver.resolve(&track.location, scope, resources).await?;
    let track_path = resolved.path;
    let mut stamps: Vec<SourceStamp> = resolved.stamp.into_iter().collect();

    let mut clips = HashMap::new();
    for clip in markers.iter().filter_map(Marker::clip) {
        if clips.contains_key(&clip.location) {
            continue;
        }
        let resolved = resolver.resolve(&clip.location, scope, resources).await?;
        stamps.extend(resolved.stamp);
        let path = resolved.path;
        if !path.is_file() {
            return Err(Error::Validation(format!(
                "clip {} source {} does not exist",
                clip.id, clip.location
            )));
        }
        clips.insert(clip.location.clone(), path);
    }

    tracing::debug!(
        resolver = resolver.name(),
        track = %track_path.display(),
        clips = clips.len(),
        downloaded = stamps.len(),
        "sources resolved"
    );

    Ok(ResolvedSources {
        track: track_path,
        clips,
        stamps,
    })
}

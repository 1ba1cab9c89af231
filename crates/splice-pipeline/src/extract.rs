//! Realizing plan slices as standalone files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use splice_av::{JobScope, MediaBackend, TempResources};
use splice_core::{Result, TimeRange};

/// Extracts `[start, end)` ranges of a source with stream copy.
#[derive(Clone)]
pub struct SliceExtractor {
    backend: Arc<dyn MediaBackend>,
}

impl SliceExtractor {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    /// Deterministic slice path: `{job basename}-{start}-{end|end}.{ext}`.
    pub fn slice_path(scope: &JobScope, range: &TimeRange, ext: &str) -> PathBuf {
        scope.file(&range.to_string(), ext)
    }

    /// Extract `range` of `source` into the job temp directory.
    ///
    /// The output path is registered with `resources` before the tool runs,
    /// so a partial file is cleaned up with everything else.
    pub async fn extract(
        &self,
        scope: &JobScope,
        resources: &TempResources,
        source: &Path,
        range: &TimeRange,
    ) -> Result<PathBuf> {
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp3".to_string());
        let output = Self::slice_path(scope, range, &ext);
        resources.register(&output);

        self.backend.extract_slice(source, range, &output).await?;
        Ok(output)
    }
}

impl std::fmt::Debug for SliceExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceExtractor")
            .field("backend", &self.backend.name())
            .finish()
    }
}

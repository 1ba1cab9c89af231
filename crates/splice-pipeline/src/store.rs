//! Where finished artifacts are published.
//!
//! [`LocalDirStore`] treats a directory as a bucket: `put` copies the file to
//! `{root}/{key}` next to a `{key}.meta.json` sidecar. Both are written under
//! temporary names and renamed into place, so readers never see a partial
//! artifact.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use splice_core::{Error, Result};

use crate::resolve::SourceStamp;

/// A published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub key: String,
    pub duration_ms: Option<u64>,
    pub location: PathBuf,
}

/// Metadata stored alongside an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub track_label: String,
    pub strategy: String,
    pub created_at: DateTime<Utc>,
    /// Validators of the downloaded inputs the artifact was stitched from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceStamp>,
}

/// Append-only artifact storage.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// The artifact stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<ArtifactRef>>;

    /// Publish `local` under `key`.
    async fn put(&self, local: &Path, key: &str, meta: &ArtifactMeta) -> Result<ArtifactRef>;
}

/// [`ArtifactStore`] backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let valid = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(Error::Storage(format!("invalid artifact key '{key}'")));
        }
        Ok(self.root.join(rel))
    }

    fn meta_path(object: &Path) -> PathBuf {
        let mut name = object.as_os_str().to_os_string();
        name.push(".meta.json");
        PathBuf::from(name)
    }
}

#[async_trait]
impl ArtifactStore for LocalDirStore {
    fn name(&self) -> &'static str {
        "local-dir"
    }

    async fn get(&self, key: &str) -> Result<Option<ArtifactRef>> {
        let object = self.object_path(key)?;
        if !tokio::fs::try_exists(&object).await? {
            return Ok(None);
        }

        let duration_ms = match tokio::fs::read(Self::meta_path(&object)).await {
            Ok(bytes) => serde_json::from_slice::<ArtifactMeta>(&bytes)
                .map(|m| m.duration_ms)
                .map_err(|e| tracing::warn!(key, error = %e, "unreadable artifact metadata"))
                .ok(),
            Err(_) => None,
        };

        Ok(Some(ArtifactRef {
            key: key.to_string(),
            duration_ms,
            location: object,
        }))
    }

    async fn put(&self, local: &Path, key: &str, meta: &ArtifactMeta) -> Result<ArtifactRef> {
        let object = self.object_path(key)?;
        let local = local.to_path_buf();
        let meta_json = serde_json::to_vec_pretty(meta)
            .map_err(|e| Error::Storage(format!("failed to encode metadata: {e}")))?;
        let dest = object.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let parent = dest
                .parent()
                .ok_or_else(|| Error::Storage(format!("no parent for {}", dest.display())))?;
            std::fs::create_dir_all(parent)?;

            let mut staged = tempfile::NamedTempFile::new_in(parent)?;
            let mut src = std::fs::File::open(&local)?;
            std::io::copy(&mut src, staged.as_file_mut())?;
            staged.as_file().sync_all()?;
            staged
                .persist(&dest)
                .map_err(|e| Error::Storage(format!("failed to publish {}: {e}", dest.display())))?;

            let mut staged_meta = tempfile::NamedTempFile::new_in(parent)?;
            staged_meta.write_all(&meta_json)?;
            staged_meta
                .persist(LocalDirStore::meta_path(&dest))
                .map_err(|e| Error::Storage(format!("failed to write metadata: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("store task failed: {e}")))??;

        tracing::info!(key, location = %object.display(), "artifact stored");
        Ok(ArtifactRef {
            key: key.to_string(),
            duration_ms: Some(meta.duration_ms),
            location: object,
        })
    }
}

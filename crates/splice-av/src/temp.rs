//! Job-scoped temp file handling.
//!
//! A [`JobScope`] names everything a job writes: files live in the scope's
//! temp directory and start with `{track label}-{job id}`, so concurrent jobs
//! never collide. A [`TempResources`] set tracks those files and removes them
//! when the job is done, including when the job future is dropped.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use splice_core::{file_safe, JobId};

/// Explicit per-job configuration threaded through every stage.
#[derive(Debug, Clone)]
pub struct JobScope {
    pub job_id: JobId,
    /// Track label (`"{id}-{uid}"`), without path separators.
    pub label: String,
    pub temp_dir: PathBuf,
}

impl JobScope {
    pub fn new(job_id: JobId, label: impl Into<String>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            label: file_safe(&label.into()),
            temp_dir: temp_dir.into(),
        }
    }

    /// `{label}-{short job id}`, the prefix of every file this job creates.
    pub fn basename(&self) -> String {
        format!("{}-{}", self.label, self.job_id.short())
    }

    /// `{temp_dir}/{basename}-{suffix}.{ext}`.
    pub fn file(&self, suffix: &str, ext: &str) -> PathBuf {
        self.temp_dir
            .join(format!("{}-{suffix}.{ext}", self.basename()))
    }
}

/// Counts from a [`TempResources::release_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseStats {
    pub removed: usize,
    pub failed: usize,
}

/// The cleanup set of one job (or one stitch attempt).
///
/// Paths are registered before anything is written to them. Dropping the set
/// releases whatever is still registered.
#[derive(Debug, Default)]
pub struct TempResources {
    paths: Mutex<Vec<PathBuf>>,
}

impl TempResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `path` to the cleanup set.
    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut paths = self.paths.lock();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    /// Hand `path` over to the caller; it will not be removed. Returns whether
    /// the path was registered.
    pub fn keep(&self, path: &Path) -> bool {
        let mut paths = self.paths.lock();
        let before = paths.len();
        paths.retain(|p| p != path);
        paths.len() != before
    }

    pub fn is_registered(&self, path: &Path) -> bool {
        self.paths.lock().iter().any(|p| p == path)
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }

    /// Remove every registered path and empty the set.
    ///
    /// Paths that are already gone count as removed. Other failures are
    /// logged and counted, never returned.
    pub fn release_all(&self) -> ReleaseStats {
        let paths = std::mem::take(&mut *self.paths.lock());
        let mut stats = ReleaseStats::default();

        for path in paths {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => stats.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => stats.removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove temp file");
                    stats.failed += 1;
                }
            }
        }

        if stats.removed + stats.failed > 0 {
            tracing::debug!(
                removed = stats.removed,
                failed = stats.failed,
                "released temp resources"
            );
        }
        stats
    }
}

impl Drop for TempResources {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scope(dir: &Path) -> JobScope {
        JobScope::new(JobId::new(), "42-Iue7KcAD", dir)
    }

    #[test]
    fn file_names_embed_label_and_job_id() {
        let dir = tempfile::tempdir().unwrap();
        let scope = scope(dir.path());
        let path = scope.file("5.000-40.000", "mp3");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(path.starts_with(dir.path()));
        assert!(name.starts_with("42-Iue7KcAD-"));
        assert!(name.contains(&scope.job_id.short()));
        assert!(name.ends_with("-5.000-40.000.mp3"));
    }

    #[test]
    fn hostile_labels_stay_in_the_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        for label in ["../../tmp/x", "a/b", "..\\up", ".."] {
            let scope = JobScope::new(JobId::new(), label, dir.path());
            let path = scope.file("stitched", "mp3");
            assert_eq!(path.parent(), Some(dir.path()), "{label}");
            assert!(!scope.label.contains('/') && !scope.label.contains(".."));
        }
    }

    #[test]
    fn scopes_for_the_same_track_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let a = scope(dir.path()).file("output", "mp3");
        let b = scope(dir.path()).file("output", "mp3");
        assert_ne!(a, b);
    }

    #[test]
    fn release_all_removes_files_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.mp3");
        let b = dir.path().join("b.mp3");
        fs::write(&a, b"a").unwrap();

        let res = TempResources::new();
        res.register(&a);
        res.register(&b); // never written
        res.register(&a); // duplicate

        assert_eq!(res.len(), 2);
        let stats = res.release_all();
        assert_eq!(stats, ReleaseStats { removed: 2, failed: 0 });
        assert!(!a.exists());
        assert!(res.is_empty());
    }

    #[test]
    fn keep_hands_over_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp3");
        fs::write(&out, b"out").unwrap();

        let res = TempResources::new();
        res.register(&out);
        assert!(res.keep(&out));
        assert!(!res.keep(&out));
        res.release_all();
        assert!(out.exists());
    }

    #[test]
    fn drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slice.mp3");
        fs::write(&path, b"x").unwrap();
        {
            let res = TempResources::new();
            res.register(&path);
        }
        assert!(!path.exists());
    }

    #[test]
    fn directories_are_removed_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("download");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("part"), b"x").unwrap();

        let res = TempResources::new();
        res.register(&sub);
        assert_eq!(res.release_all().removed, 1);
        assert!(!sub.exists());
    }
}

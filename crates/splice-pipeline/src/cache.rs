//! Content-addressed artifact cache.
//!
//! A [`Fingerprint`] is the SHA-256 of a canonical JSON description of a
//! stitch request: track identity, measured duration, source location, mode
//! and the ordered marker list. Identical fingerprints produce
//! interchangeable artifacts, so the [`ContentHashCache`] can answer a repeat
//! request from its in-memory index or from the [`ArtifactStore`] without
//! stitching again.
//!
//! Concurrent requests for the same fingerprint are coalesced: one caller
//! computes, the others wait and then read the populated entry.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use splice_core::{ClipOrigin, Error, Marker, MarkerKind, Mode, Result, Track};
use tokio::sync::Notify;

use crate::store::{ArtifactRef, ArtifactStore};

/// Hex SHA-256 identifying an equivalence class of stitch requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a stitch request.
///
/// Order sensitive. Fails with [`Error::UnsupportedSource`] when a clip is
/// third-party, since its content may change between requests.
pub fn fingerprint(
    track: &Track,
    track_duration_ms: u64,
    mode: Mode,
    markers: &[Marker],
) -> Result<Fingerprint> {
    let mut segments = Vec::with_capacity(markers.len());
    for marker in markers {
        let segment = match &marker.kind {
            MarkerKind::Insert { clip } => {
                if clip.origin == ClipOrigin::ThirdParty {
                    return Err(Error::UnsupportedSource(format!(
                        "third-party clip {} can not be cached",
                        clip.id
                    )));
                }
                json!({
                    "id": clip.id,
                    "index": clip.index,
                    "positionMillis": marker.position_millis,
                    "uploadId": clip.upload_id,
                })
            }
            MarkerKind::Remove { duration_millis } => json!({
                "positionMillis": marker.position_millis,
                "durationMillis": duration_millis,
            }),
        };
        segments.push(segment);
    }

    // serde_json maps keep keys sorted, so this serialization is canonical.
    let canonical = json!({
        "trackId": track.id,
        "trackUid": track.uid,
        "durationMillis": track_duration_ms,
        "source": track.location.to_string(),
        "mode": mode.to_string(),
        "segments": segments,
    });
    let bytes = serde_json::to_vec(&canonical)
        .map_err(|e| Error::Internal(format!("fingerprint encoding failed: {e}")))?;

    Ok(Fingerprint(hex::encode(Sha256::digest(&bytes))))
}

/// A fingerprint together with the store key its artifact lives under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: Fingerprint,
    pub storage_key: String,
}

/// Storage key: `{prefix}/{track label}-{fingerprint}.{ext}`.
pub fn storage_key(prefix: &str, label: &str, fingerprint: &Fingerprint, ext: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{label}-{fingerprint}.{ext}")
    } else {
        format!("{prefix}/{label}-{fingerprint}.{ext}")
    }
}

/// Memoizes stitched artifacts by fingerprint.
pub struct ContentHashCache {
    store: Arc<dyn ArtifactStore>,
    key_prefix: String,
    index: DashMap<Fingerprint, ArtifactRef>,
    inflight: DashMap<Fingerprint, Arc<Notify>>,
}

impl ContentHashCache {
    pub fn new(store: Arc<dyn ArtifactStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            index: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// The cache key for `fingerprint` of a job on `track`.
    pub fn key_for(&self, track: &Track, fingerprint: Fingerprint, ext: &str) -> CacheKey {
        let storage_key = storage_key(&self.key_prefix, &track.label(), &fingerprint, ext);
        CacheKey {
            fingerprint,
            storage_key,
        }
    }

    /// Number of artifacts in the in-memory index.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Find a previously produced artifact: in memory first, then the store.
    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<ArtifactRef>> {
        if let Some(entry) = self.index.get(&key.fingerprint) {
            return Ok(Some(entry.value().clone()));
        }

        let stored = self.store.get(&key.storage_key).await?;
        if let Some(ref artifact) = stored {
            tracing::debug!(key = %key.storage_key, "artifact found in store");
            self.index.insert(key.fingerprint.clone(), artifact.clone());
        }
        Ok(stored)
    }

    /// Record a successfully produced artifact.
    pub fn populate(&self, key: &CacheKey, artifact: ArtifactRef) {
        self.index.insert(key.fingerprint.clone(), artifact);
    }

    /// Return the cached artifact for `key`, or run `compute` to produce it.
    ///
    /// At most one `compute` runs per fingerprint at a time. Callers that
    /// arrive while it runs wait for it; if it fails they retry, one of them
    /// becoming the next producer. Failures never populate the cache.
    ///
    /// The boolean is `true` when the artifact came from the cache.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> Result<(ArtifactRef, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ArtifactRef>>,
    {
        let mut compute = Some(compute);
        loop {
            if let Some(hit) = self.lookup(key).await? {
                return Ok((hit, true));
            }

            match self.inflight.entry(key.fingerprint.clone()) {
                Entry::Occupied(e) => {
                    let notify = e.get().clone();
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    // Register before releasing the map entry so a wake-up
                    // between the two is not lost.
                    notified.as_mut().enable();
                    drop(e);

                    tracing::debug!(fingerprint = key.fingerprint.short(), "waiting for in-flight stitch");
                    notified.await;
                }
                Entry::Vacant(e) => {
                    let notify = Arc::new(Notify::new());
                    e.insert(notify.clone());
                    let _guard = InflightGuard {
                        inflight: &self.inflight,
                        fingerprint: &key.fingerprint,
                        notify,
                    };

                    // A previous producer may have finished while our store
                    // read was pending.
                    if let Some(hit) = self.index.get(&key.fingerprint).map(|e| e.value().clone()) {
                        return Ok((hit, true));
                    }

                    let Some(compute) = compute.take() else {
                        return Err(Error::Internal("cache compute already consumed".into()));
                    };
                    let artifact = compute().await?;
                    self.populate(key, artifact.clone());
                    return Ok((artifact, false));
                }
            }
        }
    }
}

impl fmt::Debug for ContentHashCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHashCache")
            .field("store", &self.store.name())
            .field("key_prefix", &self.key_prefix)
            .field("entries", &self.index.len())
            .finish()
    }
}

/// Clears the in-flight marker and wakes waiters when the producer finishes,
/// fails, or is dropped mid-way.
struct InflightGuard<'a> {
    inflight: &'a DashMap<Fingerprint, Arc<Notify>>,
    fingerprint: &'a Fingerprint,
    notify: Arc<Notify>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.remove(self.fingerprint);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalDirStore;
    use splice_core::{ClipRef, SourceRef};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn track() -> Track {
        Track::new("Iue7KcAD", SourceRef::parse("/in/episode.mp3")).with_id("12")
    }

    fn clip(id: &str) -> ClipRef {
        ClipRef::new(id, SourceRef::parse(&format!("/ads/{id}.mp3")))
    }

    fn markers() -> Vec<Marker> {
        vec![
            Marker::insert(5_000, clip("a").with_index(0)),
            Marker::insert(40_000, clip("b").with_index(1)),
        ]
    }

    fn artifact(key: &CacheKey) -> ArtifactRef {
        ArtifactRef {
            key: key.storage_key.clone(),
            duration_ms: Some(1_000),
            location: PathBuf::from("/store").join(&key.storage_key),
        }
    }

    fn cache(root: &std::path::Path) -> ContentHashCache {
        ContentHashCache::new(Arc::new(LocalDirStore::new(root)), "v1-stitched")
    }

    #[test]
    fn fingerprint_is_deterministic_hex() {
        let a = fingerprint(&track(), 90_000, Mode::Insert, &markers()).unwrap();
        let b = fingerprint(&track(), 90_000, Mode::Insert, &markers()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_changes_with_inputs() {
        let base = fingerprint(&track(), 90_000, Mode::Insert, &markers()).unwrap();

        let mut reordered = markers();
        reordered.reverse();
        assert_ne!(base, fingerprint(&track(), 90_000, Mode::Insert, &reordered).unwrap());
        assert_ne!(base, fingerprint(&track(), 90_001, Mode::Insert, &markers()).unwrap());

        let mut moved = markers();
        moved[0].position_millis = 6_000;
        assert_ne!(base, fingerprint(&track(), 90_000, Mode::Insert, &moved).unwrap());

        let other_track = Track::new("other", SourceRef::parse("/in/episode.mp3"));
        assert_ne!(base, fingerprint(&other_track, 90_000, Mode::Insert, &markers()).unwrap());

        let remove_a = fingerprint(&track(), 90_000, Mode::Remove, &[Marker::remove(0, 1_000)]).unwrap();
        let remove_b = fingerprint(&track(), 90_000, Mode::Remove, &[Marker::remove(0, 2_000)]).unwrap();
        assert_ne!(remove_a, remove_b);
    }

    #[test]
    fn third_party_clips_are_not_fingerprinted() {
        let tp = clip("dyn").with_origin(ClipOrigin::ThirdParty);
        let err = fingerprint(&track(), 90_000, Mode::Insert, &[Marker::insert(0, tp)]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSource(_)));
    }

    #[test]
    fn storage_key_layout() {
        let fp = Fingerprint("abc".into());
        assert_eq!(storage_key("v1-stitched", "12-uid", &fp, "mp3"), "v1-stitched/12-uid-abc.mp3");
        assert_eq!(storage_key("/", "-uid", &fp, "mp3"), "-uid-abc.mp3");
    }

    #[tokio::test]
    async fn second_request_is_a_hit() {
        let root = tempfile::tempdir().unwrap();
        let cache = cache(root.path());
        let fp = fingerprint(&track(), 90_000, Mode::Insert, &markers()).unwrap();
        let key = cache.key_for(&track(), fp, "mp3");
        let calls = AtomicUsize::new(0);

        let (first, cached) = cache
            .get_or_compute(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(artifact(&key))
            })
            .await
            .unwrap();
        assert!(!cached);

        let (second, cached) = cache
            .get_or_compute(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(artifact(&key))
            })
            .await
            .unwrap();
        assert!(cached);
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_does_not_populate() {
        let root = tempfile::tempdir().unwrap();
        let cache = cache(root.path());
        let key = cache.key_for(&track(), Fingerprint("f".into()), "mp3");

        let result = cache
            .get_or_compute(&key, || async { Err(Error::Concatenation("boom".into())) })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
        assert!(cache.lookup(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_requests_compute_once() {
        let root = tempfile::tempdir().unwrap();
        let cache = Arc::new(cache(root.path()));
        let key = cache.key_for(&track(), Fingerprint("same".into()), "mp3");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let key = key.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(&key, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(artifact(&key))
                    })
                    .await
            }));
        }

        let mut misses = 0;
        for handle in handles {
            let (_, cached) = handle.await.unwrap().unwrap();
            if !cached {
                misses += 1;
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(misses, 1);
    }

    #[tokio::test]
    async fn waiter_takes_over_after_failed_producer() {
        let root = tempfile::tempdir().unwrap();
        let cache = Arc::new(cache(root.path()));
        let key = cache.key_for(&track(), Fingerprint("retry".into()), "mp3");

        let leader = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&key, || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err(Error::FilterGraph("first attempt failed".into()))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (artifact_ref, cached) = cache
            .get_or_compute(&key, || async { Ok(artifact(&key)) })
            .await
            .unwrap();
        assert!(!cached);
        assert_eq!(artifact_ref.key, key.storage_key);
        assert!(leader.await.unwrap().is_err());
    }

    /// Store whose reads are slow and never find anything.
    struct SlowStore;

    #[async_trait::async_trait]
    impl ArtifactStore for SlowStore {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn get(&self, _key: &str) -> Result<Option<ArtifactRef>> {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(None)
        }

        async fn put(
            &self,
            local: &std::path::Path,
            key: &str,
            meta: &crate::store::ArtifactMeta,
        ) -> Result<ArtifactRef> {
            Ok(ArtifactRef {
                key: key.to_string(),
                duration_ms: Some(meta.duration_ms),
                location: local.to_path_buf(),
            })
        }
    }

    #[tokio::test]
    async fn late_caller_reuses_artifact_finished_during_store_read() {
        let cache = Arc::new(ContentHashCache::new(Arc::new(SlowStore), "v1-stitched"));
        let key = cache.key_for(&track(), Fingerprint("slow".into()), "mp3");
        let calls = Arc::new(AtomicUsize::new(0));

        // Leader: 40ms store miss, then 60ms of stitching, done at ~100ms.
        let leader = {
            let cache = cache.clone();
            let key = key.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&key, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(60)).await;
                        Ok(artifact(&key))
                    })
                    .await
            })
        };

        // Arrives at ~70ms; its own store read is still pending when the
        // leader populates the index and clears the in-flight entry.
        tokio::time::sleep(Duration::from_millis(70)).await;
        let (second, cached) = cache
            .get_or_compute(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(artifact(&key))
            })
            .await
            .unwrap();

        let (first, _) = leader.await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cached);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn lookup_falls_back_to_store() {
        let root = tempfile::tempdir().unwrap();
        let key = CacheKey {
            fingerprint: Fingerprint("persisted".into()),
            storage_key: "v1-stitched/12-Iue7KcAD-persisted.mp3".into(),
        };
        std::fs::create_dir_all(root.path().join("v1-stitched")).unwrap();
        std::fs::write(root.path().join(&key.storage_key), b"audio").unwrap();

        let cache = cache(root.path());
        let hit = cache.lookup(&key).await.unwrap().unwrap();
        assert_eq!(hit.location, root.path().join(&key.storage_key));
        assert_eq!(cache.len(), 1);
    }
}

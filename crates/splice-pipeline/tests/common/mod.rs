//! In-process media backend for pipeline tests.
//!
//! Every "audio" file is a text file containing `duration_ms=N`. The fake
//! backend reads and writes that format, so stitched durations can be
//! checked without ffmpeg.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use splice_av::{AudioInfo, MediaBackend};
use splice_core::{Error, Result, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Probe,
    Extract,
    Concat,
    FilterGraph,
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    pub probes: AtomicUsize,
    pub extracts: AtomicUsize,
    pub concats: AtomicUsize,
    pub graphs: AtomicUsize,
    fail_at: Mutex<Option<Stage>>,
    delay: Mutex<Option<Duration>>,
    skew_ms: Mutex<i64>,
    last_graph: Mutex<Option<String>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_at(&self, stage: Stage) {
        *self.fail_at.lock() = Some(stage);
    }

    pub fn clear_failure(&self) {
        *self.fail_at.lock() = None;
    }

    /// Delay concat and filter graph runs.
    pub fn delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Make stitched outputs `ms` longer (or shorter) than their inputs.
    pub fn skew(&self, ms: i64) {
        *self.skew_ms.lock() = ms;
    }

    pub fn last_graph(&self) -> Option<String> {
        self.last_graph.lock().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn failing(&self, stage: Stage) -> bool {
        *self.fail_at.lock() == Some(stage)
    }

    fn skewed(&self, total: u64) -> u64 {
        total.saturating_add_signed(*self.skew_ms.lock())
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }
}

/// Write a fake audio file of `duration_ms`.
pub fn write_audio(path: &Path, duration_ms: u64) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, format!("duration_ms={duration_ms}")).unwrap();
}

pub fn read_duration(path: &Path) -> Option<u64> {
    let text = std::fs::read_to_string(path).ok()?;
    text.trim().strip_prefix("duration_ms=")?.parse().ok()
}

fn secs_to_ms(arg: &str) -> u64 {
    (arg.parse::<f64>().unwrap_or(0.0) * 1000.0).round() as u64
}

/// Files in `dir`, recursively.
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(files_in(&path));
        } else {
            out.push(path);
        }
    }
    out
}

#[async_trait]
impl MediaBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self, path: &Path) -> Result<AudioInfo> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.failing(Stage::Probe) {
            return Err(Error::MediaProbe("injected probe failure".into()));
        }
        let duration_ms = read_duration(path)
            .ok_or_else(|| Error::MediaProbe(format!("cannot read {}", path.display())))?;
        Ok(AudioInfo {
            duration_secs: duration_ms as f64 / 1000.0,
            channels: Some(2),
            sample_rate: Some(44_100),
            bitrate: Some(128_000),
            codec: Some("mp3".into()),
        })
    }

    async fn extract_slice(&self, source: &Path, range: &TimeRange, output: &Path) -> Result<()> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        if self.failing(Stage::Extract) {
            std::fs::write(output, b"partial")?;
            return Err(Error::extraction(range.to_string(), "injected extract failure"));
        }
        let total = read_duration(source)
            .ok_or_else(|| Error::extraction(range.to_string(), "unreadable source"))?;
        write_audio(output, range.len_ms(total));
        Ok(())
    }

    async fn concatenate(&self, manifest: &Path, output: &Path) -> Result<()> {
        self.concats.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.failing(Stage::Concat) {
            std::fs::write(output, b"partial")?;
            return Err(Error::Concatenation("injected concat failure".into()));
        }
        let text = std::fs::read_to_string(manifest)?;
        let mut total = 0;
        for line in text.lines() {
            let path = line
                .strip_prefix("file '")
                .and_then(|l| l.strip_suffix('\''))
                .map(|l| l.replace(r"'\''", "'"))
                .ok_or_else(|| Error::Concatenation(format!("bad manifest line {line}")))?;
            total += read_duration(Path::new(&path))
                .ok_or_else(|| Error::Concatenation(format!("missing component {path}")))?;
        }
        write_audio(output, self.skewed(total));
        Ok(())
    }

    async fn filter_graph_stitch(
        &self,
        inputs: &[PathBuf],
        graph: &str,
        output: &Path,
    ) -> Result<()> {
        self.graphs.fetch_add(1, Ordering::SeqCst);
        *self.last_graph.lock() = Some(graph.to_string());
        self.pause().await;
        if self.failing(Stage::FilterGraph) {
            std::fs::write(output, b"partial")?;
            return Err(Error::FilterGraph("injected filter graph failure".into()));
        }

        let duration_of = |i: usize| {
            inputs
                .get(i)
                .and_then(|p| read_duration(p))
                .ok_or_else(|| Error::FilterGraph(format!("input {i} unreadable")))
        };
        let track_ms = duration_of(0)?;

        let mut total = 0;
        for filter in graph.split(';') {
            if let Some(trim) = filter
                .strip_prefix("[0:a]atrim=")
                .and_then(|f| f.split(',').next())
            {
                let mut start = 0;
                let mut end = track_ms;
                for kv in trim.split(':') {
                    match kv.split_once('=') {
                        Some(("start", v)) => start = secs_to_ms(v),
                        Some(("end", v)) => end = secs_to_ms(v),
                        _ => {}
                    }
                }
                total += end.saturating_sub(start);
            } else if let Some((input, _)) = filter.strip_prefix('[').and_then(|f| f.split_once(":a]anull")) {
                let index: usize = input
                    .parse()
                    .map_err(|_| Error::FilterGraph(format!("bad tap {filter}")))?;
                total += duration_of(index)?;
            }
        }
        write_audio(output, self.skewed(total));
        Ok(())
    }
}

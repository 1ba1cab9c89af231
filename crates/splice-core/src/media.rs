//! Media-domain types: tracks, clips, markers, time ranges, modes and
//! strategies.
//!
//! Enums serialize in kebab/lowercase form and implement `Display` manually
//! for consistent string representation in logs and file names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// SourceRef
// ---------------------------------------------------------------------------

/// Where a track or clip lives before it enters the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRef {
    /// A file on the local filesystem.
    Local(PathBuf),
    /// A remote object that must be retrieved first (http/https URL).
    Remote(String),
}

impl SourceRef {
    /// Parse a caller-supplied location: `http://` and `https://` prefixes are
    /// remote, everything else is a local path.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::Remote(location.to_string())
        } else {
            Self::Local(PathBuf::from(location))
        }
    }

    /// Whether the source must be retrieved before use.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(p) => write!(f, "{}", p.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

/// The original track that slices are cut from.
///
/// The duration is deliberately absent: it is always measured by probing the
/// resolved file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Optional numeric/legacy identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Stable unique identifier.
    pub uid: String,
    /// Source location of the original audio.
    pub location: SourceRef,
}

impl Track {
    pub fn new(uid: impl Into<String>, location: SourceRef) -> Self {
        Self {
            id: None,
            uid: uid.into(),
            location,
        }
    }

    /// Builder: set the legacy id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// `"{id}-{uid}"` (id may be empty), the name prefix of every artifact
    /// derived from this track. Safe to use as a single path component.
    pub fn label(&self) -> String {
        file_safe(&format!("{}-{}", self.id.as_deref().unwrap_or(""), self.uid))
    }
}

/// Replace `..` and path separators with `_` so caller-supplied ids can
/// not escape the directory a file name is joined to.
pub fn file_safe(name: &str) -> String {
    name.replace("..", "_").replace(['/', '\\'], "_")
}

// ---------------------------------------------------------------------------
// ClipRef
// ---------------------------------------------------------------------------

/// Where a clip's content comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClipOrigin {
    /// Uploaded, immutable audio.
    #[default]
    Static,
    /// Served by a third-party ad service; content may change per request.
    ThirdParty,
}

impl fmt::Display for ClipOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::ThirdParty => write!(f, "third-party"),
        }
    }
}

/// An externally supplied clip (ad, intro, outro).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRef {
    /// Clip identity used in the cache fingerprint.
    pub id: String,
    /// Where the clip audio lives.
    pub location: SourceRef,
    /// Position of the clip in the caller's ordering.
    #[serde(default)]
    pub index: u32,
    /// Identity of the uploaded content, when the caller tracks it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub origin: ClipOrigin,
}

impl ClipRef {
    pub fn new(id: impl Into<String>, location: SourceRef) -> Self {
        Self {
            id: id.into(),
            location,
            index: 0,
            upload_id: None,
            origin: ClipOrigin::Static,
        }
    }

    /// Builder: set the ordering index.
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// Builder: set the origin.
    pub fn with_origin(mut self, origin: ClipOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Builder: set the upload id.
    pub fn with_upload_id(mut self, upload_id: impl Into<String>) -> Self {
        self.upload_id = Some(upload_id.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Marker
// ---------------------------------------------------------------------------

/// What happens at a marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MarkerKind {
    /// Insert a clip at the marker position.
    Insert { clip: ClipRef },
    /// Excise `duration_millis` of the track starting at the marker.
    Remove { duration_millis: u64 },
}

/// A millisecond-resolution edit point on the original track.
///
/// `position_millis == 0` is a leading edit; a negative position is the
/// outro sentinel ("after everything else").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub position_millis: i64,
    #[serde(flatten)]
    pub kind: MarkerKind,
}

impl Marker {
    /// An insertion of `clip` at `position_millis`.
    pub fn insert(position_millis: i64, clip: ClipRef) -> Self {
        Self {
            position_millis,
            kind: MarkerKind::Insert { clip },
        }
    }

    /// An outro insertion (negative sentinel position).
    pub fn outro(clip: ClipRef) -> Self {
        Self::insert(-1, clip)
    }

    /// A removal of `duration_millis` starting at `position_millis`.
    pub fn remove(position_millis: i64, duration_millis: u64) -> Self {
        Self {
            position_millis,
            kind: MarkerKind::Remove { duration_millis },
        }
    }

    pub fn is_outro(&self) -> bool {
        self.position_millis < 0
    }

    /// The clip of an insert marker.
    pub fn clip(&self) -> Option<&ClipRef> {
        match &self.kind {
            MarkerKind::Insert { clip } => Some(clip),
            MarkerKind::Remove { .. } => None,
        }
    }

    /// The mode this marker belongs to.
    pub fn mode(&self) -> Mode {
        match self.kind {
            MarkerKind::Insert { .. } => Mode::Insert,
            MarkerKind::Remove { .. } => Mode::Remove,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeRange
// ---------------------------------------------------------------------------

/// A half-open `[start_ms, end_ms)` range of the original track.
///
/// `end_ms == None` means "to the end of the track".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ms: Option<u64>,
}

impl TimeRange {
    pub fn new(start_ms: u64, end_ms: u64) -> Self {
        Self {
            start_ms,
            end_ms: Some(end_ms),
        }
    }

    /// A range running from `start_ms` to the end of the track.
    pub fn open(start_ms: u64) -> Self {
        Self {
            start_ms,
            end_ms: None,
        }
    }

    /// Length of the range on a track of `track_ms` milliseconds.
    pub fn len_ms(&self, track_ms: u64) -> u64 {
        self.end_ms
            .unwrap_or(track_ms)
            .min(track_ms)
            .saturating_sub(self.start_ms)
    }

    /// Start as ffmpeg seconds, e.g. `5.000`.
    pub fn start_arg(&self) -> String {
        millis_to_secs_arg(self.start_ms)
    }

    /// End as ffmpeg seconds, if the range is closed.
    pub fn end_arg(&self) -> Option<String> {
        self.end_ms.map(millis_to_secs_arg)
    }
}

impl fmt::Display for TimeRange {
    /// `5.000-40.000`, or `70.000-end` for an open range.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end_ms {
            Some(end) => write!(f, "{}-{}", self.start_arg(), millis_to_secs_arg(end)),
            None => write!(f, "{}-end", self.start_arg()),
        }
    }
}

/// Exact decimal seconds for a millisecond value (`1500` -> `"1.500"`).
pub fn millis_to_secs_arg(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Whether markers insert clips or excise regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    #[serde(alias = "stitch")]
    Insert,
    Remove,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" | "stitch" => Ok(Self::Insert),
            "remove" => Ok(Self::Remove),
            other => Err(format!("unknown mode '{other}' (expected insert or remove)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// How a plan is turned into one output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Extract lossless slices, then merge them with the concat demuxer.
    #[default]
    Concat,
    /// Trim and join everything in one filter graph (one re-encode).
    FilterGraph,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concat => write!(f, "concat"),
            Self::FilterGraph => write!(f, "filter-graph"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "concat" | "lossless" => Ok(Self::Concat),
            "filter-graph" | "filtergraph" | "encode" => Ok(Self::FilterGraph),
            other => Err(format!(
                "unknown strategy '{other}' (expected concat or filter-graph)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ref_parse() {
        assert_eq!(
            SourceRef::parse("https://cdn.example.com/a.mp3"),
            SourceRef::Remote("https://cdn.example.com/a.mp3".into())
        );
        assert_eq!(
            SourceRef::parse("/tmp/a.mp3"),
            SourceRef::Local(PathBuf::from("/tmp/a.mp3"))
        );
        assert!(SourceRef::parse("http://x/y").is_remote());
    }

    #[test]
    fn track_label_with_and_without_id() {
        let t = Track::new("Iue7KcAD", SourceRef::parse("/a.mp3"));
        assert_eq!(t.label(), "-Iue7KcAD");
        assert_eq!(t.with_id("42").label(), "42-Iue7KcAD");
    }

    #[test]
    fn track_label_is_a_single_path_component() {
        let t = Track::new("../../etc/passwd", SourceRef::parse("/a.mp3")).with_id("a\\b");
        let label = t.label();
        assert_eq!(label, "a_b-___etc_passwd");
        assert_eq!(std::path::Path::new(&label).components().count(), 1);
        assert_eq!(file_safe("..."), "_.");
    }

    #[test]
    fn marker_helpers() {
        let clip = ClipRef::new("ad-1", SourceRef::parse("/ads/1.mp3"));
        let m = Marker::insert(5000, clip.clone());
        assert_eq!(m.mode(), Mode::Insert);
        assert_eq!(m.clip(), Some(&clip));
        assert!(!m.is_outro());
        assert!(Marker::outro(clip).is_outro());

        let r = Marker::remove(0, 20_000);
        assert_eq!(r.mode(), Mode::Remove);
        assert!(r.clip().is_none());
    }

    #[test]
    fn mode_and_strategy_from_str() {
        assert_eq!("stitch".parse::<Mode>().unwrap(), Mode::Insert);
        assert_eq!("REMOVE".parse::<Mode>().unwrap(), Mode::Remove);
        assert!("mix".parse::<Mode>().is_err());

        assert_eq!("filter_graph".parse::<Strategy>().unwrap(), Strategy::FilterGraph);
        assert_eq!("concat".parse::<Strategy>().unwrap(), Strategy::Concat);
        assert_eq!(Strategy::FilterGraph.to_string(), "filter-graph");
    }

    #[test]
    fn time_range_args_and_length() {
        let r = TimeRange::new(5_000, 40_250);
        assert_eq!(r.start_arg(), "5.000");
        assert_eq!(r.end_arg().as_deref(), Some("40.250"));
        assert_eq!(r.len_ms(90_000), 35_250);
        assert_eq!(r.to_string(), "5.000-40.250");

        let tail = TimeRange::open(70_000);
        assert_eq!(tail.end_arg(), None);
        assert_eq!(tail.len_ms(90_000), 20_000);
        assert_eq!(tail.to_string(), "70.000-end");
        assert_eq!(TimeRange::open(90_000).len_ms(90_000), 0);
    }

    #[test]
    fn marker_serde_shape() {
        let m = Marker::remove(40_000, 20_000);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["position_millis"], 40_000);
        assert_eq!(json["kind"], "remove");
        assert_eq!(json["duration_millis"], 20_000);
    }
}

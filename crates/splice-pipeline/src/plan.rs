//! The ordered sequence of slices and clips a stitcher turns into one file.

use std::path::PathBuf;

use serde::Serialize;
use splice_core::{ClipOrigin, Mode, SourceRef, TimeRange};

/// A clip resolved to a local file, ready to be stitched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanClip {
    pub id: String,
    /// Local file the clip audio is read from.
    pub path: PathBuf,
    /// Where the caller said the clip lives.
    pub source: SourceRef,
    pub origin: ClipOrigin,
}

/// One component of the stitched output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlanItem {
    /// A range of the original track.
    Slice(TimeRange),
    /// An external clip, inserted whole.
    Clip(PlanClip),
}

impl PlanItem {
    pub fn as_slice(&self) -> Option<&TimeRange> {
        match self {
            PlanItem::Slice(r) => Some(r),
            PlanItem::Clip(_) => None,
        }
    }

    pub fn as_clip(&self) -> Option<&PlanClip> {
        match self {
            PlanItem::Clip(c) => Some(c),
            PlanItem::Slice(_) => None,
        }
    }
}

/// Output of the segment planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub mode: Mode,
    /// Local file of the original track.
    pub track_path: PathBuf,
    pub track_duration_ms: u64,
    pub items: Vec<PlanItem>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn slices(&self) -> impl Iterator<Item = &TimeRange> {
        self.items.iter().filter_map(PlanItem::as_slice)
    }

    pub fn clips(&self) -> impl Iterator<Item = &PlanClip> {
        self.items.iter().filter_map(PlanItem::as_clip)
    }

    /// Total length of the original track kept in the output.
    pub fn retained_ms(&self) -> u64 {
        self.slices()
            .map(|r| r.len_ms(self.track_duration_ms))
            .sum()
    }
}

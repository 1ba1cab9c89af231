//! Segment planning: markers on the original track to an ordered [`Plan`].
//!
//! Insert mode walks the markers with a cursor, cutting the track at each
//! marker and placing the clip after the cut:
//!
//! ```text
//! markers  5s:A  40s:B  70s:C   (track 90s)
//! plan     [0,5) A [5,40) B [40,70) C [70,end)
//! ```
//!
//! Remove mode keeps everything between the excised regions:
//!
//! ```text
//! regions  0+20s  40+20s  70+20s   (track 90s)
//! plan     [20,40) [60,70)
//! ```
//!
//! The trailing slice is always computed and then dropped when it is empty,
//! like every other zero-length slice.

use splice_core::{Error, Marker, MarkerKind, Mode, Result, TimeRange};

use crate::plan::{Plan, PlanClip, PlanItem};
use crate::resolve::ResolvedSources;

/// Pure planner; holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentPlanner;

impl SegmentPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Build the plan for `markers` on a track of `track_duration_ms`.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an empty marker list, markers of the wrong
    /// mode, markers out of order or beyond the track, overlapping or
    /// zero-length removals, and clips without a resolved file.
    pub fn plan(
        &self,
        mode: Mode,
        markers: &[Marker],
        sources: &ResolvedSources,
        track_duration_ms: u64,
    ) -> Result<Plan> {
        if markers.is_empty() {
            return Err(Error::Validation("segments can not be empty".into()));
        }
        if track_duration_ms == 0 {
            return Err(Error::MediaProbe("track duration is zero".into()));
        }
        if let Some((i, m)) = markers.iter().enumerate().find(|(_, m)| m.mode() != mode) {
            return Err(Error::Validation(format!(
                "segment {i} is a {} marker in {mode} mode",
                m.mode()
            )));
        }

        let mut items = match mode {
            Mode::Insert => plan_insert(markers, sources, track_duration_ms)?,
            Mode::Remove => plan_remove(markers, track_duration_ms)?,
        };
        items.retain(|item| match item {
            PlanItem::Slice(range) => range.len_ms(track_duration_ms) > 0,
            PlanItem::Clip(_) => true,
        });

        let plan = Plan {
            mode,
            track_path: sources.track.clone(),
            track_duration_ms,
            items,
        };
        tracing::debug!(
            mode = %mode,
            items = plan.len(),
            retained_ms = plan.retained_ms(),
            "plan built"
        );
        Ok(plan)
    }
}

fn plan_insert(
    markers: &[Marker],
    sources: &ResolvedSources,
    duration_ms: u64,
) -> Result<Vec<PlanItem>> {
    let mut items = Vec::with_capacity(markers.len() * 2 + 1);
    let mut outros = Vec::new();
    let mut cursor: u64 = 0;

    for (i, marker) in markers.iter().enumerate() {
        let clip = plan_clip(i, marker, sources)?;
        if marker.is_outro() {
            outros.push(clip);
            continue;
        }

        let position = marker.position_millis as u64;
        if position > duration_ms {
            return Err(Error::Validation(format!(
                "segment {i} at {position}ms is beyond the track duration of {duration_ms}ms"
            )));
        }

        if position == 0 && cursor == 0 {
            items.push(PlanItem::Clip(clip));
        } else if position > cursor {
            items.push(PlanItem::Slice(TimeRange::new(cursor, position)));
            items.push(PlanItem::Clip(clip));
            cursor = position;
        } else {
            return Err(Error::Validation(format!(
                "non-monotonic marker: segment {i} at {position}ms does not come after {cursor}ms"
            )));
        }
    }

    items.push(PlanItem::Slice(TimeRange::open(cursor)));
    items.extend(outros.into_iter().map(PlanItem::Clip));
    Ok(items)
}

fn plan_clip(i: usize, marker: &Marker, sources: &ResolvedSources) -> Result<PlanClip> {
    let clip = marker
        .clip()
        .ok_or_else(|| Error::Validation(format!("segment {i} has no clip")))?;
    let path = sources.clip_path(clip).ok_or_else(|| {
        Error::Validation(format!(
            "segment {i}: clip {} has no resolved source",
            clip.id
        ))
    })?;
    Ok(PlanClip {
        id: clip.id.clone(),
        path: path.to_path_buf(),
        source: clip.location.clone(),
        origin: clip.origin,
    })
}

fn plan_remove(markers: &[Marker], duration_ms: u64) -> Result<Vec<PlanItem>> {
    let mut items = Vec::with_capacity(markers.len() + 1);
    let mut cursor: u64 = 0;

    for (i, marker) in markers.iter().enumerate() {
        let MarkerKind::Remove { duration_millis } = marker.kind else {
            return Err(Error::Validation(format!("segment {i} is not a removal")));
        };
        if marker.is_outro() {
            return Err(Error::Validation(format!(
                "segment {i} has a negative position; outros only exist in insert mode"
            )));
        }
        if duration_millis == 0 {
            return Err(Error::Validation(format!(
                "segment {i} removes nothing (duration is 0)"
            )));
        }

        let start = marker.position_millis as u64;
        let end = start.saturating_add(duration_millis);
        if start < cursor {
            return Err(Error::Validation(format!(
                "segment {i} at {start}ms overlaps the previous removal ending at {cursor}ms"
            )));
        }
        if end > duration_ms {
            return Err(Error::Validation(format!(
                "segment {i} ends at {end}ms, beyond the track duration of {duration_ms}ms"
            )));
        }

        if start > cursor {
            items.push(PlanItem::Slice(TimeRange::new(cursor, start)));
        }
        cursor = end;
    }

    items.push(PlanItem::Slice(TimeRange::open(cursor)));
    Ok(items)
}

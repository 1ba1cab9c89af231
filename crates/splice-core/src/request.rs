//! The job input shape accepted from callers.
//!
//! ```json
//! {
//!   "trackFile": "episode.mp3",
//!   "mode": "insert",
//!   "segments": [
//!     { "positionMillis": 5000, "filepath": "kfc.mp3" },
//!     { "positionMillis": -1, "filepath": "outro.mp3" }
//!   ]
//! }
//! ```
//!
//! The older `{ "track_file", "cmd", "ad_segments": [{ "markInMillis",
//! "duration", "filepath" }] }` shape is accepted through serde aliases.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::media::{ClipOrigin, ClipRef, Marker, Mode, SourceRef, Track};
use crate::{Error, Result};

/// One marker as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSpec {
    #[serde(alias = "markInMillis", alias = "mark_in_millis")]
    pub position_millis: i64,
    /// Length of the removed region (remove mode only).
    #[serde(default, alias = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_millis: Option<u64>,
    /// Clip location (insert mode only); local path or URL.
    #[serde(default, alias = "filePath", skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    /// Clip identity; defaults to the filepath.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Ordering index; defaults to the position in the segment list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub third_party: bool,
}

/// A complete stitch request as read from a job file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    #[serde(alias = "track_file")]
    pub track_file: String,
    #[serde(default, alias = "cmd")]
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    /// Defaults to the file stem of `track_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_uid: Option<String>,
    #[serde(alias = "ad_segments")]
    pub segments: Vec<SegmentSpec>,
}

impl JobSpec {
    /// Parse a job file.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Validation(format!("job parse error: {e}")))
    }

    /// Build the track described by this spec.
    pub fn track(&self) -> Track {
        let uid = self.track_uid.clone().unwrap_or_else(|| {
            Path::new(&self.track_file)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "track".to_string())
        });
        Track {
            id: self.track_id.clone(),
            uid,
            location: SourceRef::parse(&self.track_file),
        }
    }

    /// Convert the caller's segments into typed markers.
    ///
    /// Only shape problems are caught here (a missing `filepath` in insert
    /// mode, a missing `durationMillis` in remove mode). Ordering and bounds
    /// are checked by the planner once the track duration is known.
    pub fn markers(&self) -> Result<Vec<Marker>> {
        self.segments
            .iter()
            .enumerate()
            .map(|(i, seg)| match self.mode {
                Mode::Insert => {
                    let path = seg.filepath.as_deref().ok_or_else(|| {
                        Error::Validation(format!("segment {i} has no filepath"))
                    })?;
                    let mut clip = ClipRef::new(
                        seg.id.clone().unwrap_or_else(|| path.to_string()),
                        SourceRef::parse(path),
                    )
                    .with_index(seg.index.unwrap_or(i as u32));
                    if let Some(ref upload) = seg.upload_id {
                        clip = clip.with_upload_id(upload.clone());
                    }
                    if seg.third_party {
                        clip = clip.with_origin(ClipOrigin::ThirdParty);
                    }
                    Ok(Marker::insert(seg.position_millis, clip))
                }
                Mode::Remove => {
                    let duration = seg.duration_millis.ok_or_else(|| {
                        Error::Validation(format!("segment {i} has no durationMillis"))
                    })?;
                    Ok(Marker::remove(seg.position_millis, duration))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MarkerKind;

    #[test]
    fn parse_current_shape() {
        let spec = JobSpec::from_json(
            r#"{
                "trackFile": "/audio/episode.mp3",
                "mode": "insert",
                "trackId": "12",
                "segments": [
                    {"positionMillis": 5000, "filepath": "/ads/kfc.mp3", "uploadId": "u1"},
                    {"positionMillis": -1, "filepath": "https://cdn.example.com/outro.mp3", "thirdParty": true}
                ]
            }"#,
        )
        .unwrap();

        let track = spec.track();
        assert_eq!(track.label(), "12-episode");
        assert_eq!(track.location, SourceRef::Local("/audio/episode.mp3".into()));

        let markers = spec.markers().unwrap();
        assert_eq!(markers.len(), 2);
        let first = markers[0].clip().unwrap();
        assert_eq!(first.id, "/ads/kfc.mp3");
        assert_eq!(first.index, 0);
        assert_eq!(first.upload_id.as_deref(), Some("u1"));
        let outro = markers[1].clip().unwrap();
        assert!(markers[1].is_outro());
        assert_eq!(outro.origin, ClipOrigin::ThirdParty);
        assert!(outro.location.is_remote());
    }

    #[test]
    fn parse_legacy_remove_shape() {
        let spec = JobSpec::from_json(
            r#"{
                "track_file": "ivm_episode1.mp3",
                "cmd": "remove",
                "ad_segments": [
                    {"markInMillis": 0, "duration": 20000},
                    {"markInMillis": 40000, "duration": 20000}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(spec.mode, Mode::Remove);
        let markers = spec.markers().unwrap();
        assert_eq!(
            markers[1].kind,
            MarkerKind::Remove {
                duration_millis: 20_000
            }
        );
        assert_eq!(markers[1].position_millis, 40_000);
    }

    #[test]
    fn legacy_stitch_cmd_maps_to_insert() {
        let spec = JobSpec::from_json(
            r#"{"track_file": "a.mp3", "cmd": "stitch",
                "ad_segments": [{"markInMillis": 12000, "filepath": "short-1.mp3"}]}"#,
        )
        .unwrap();
        assert_eq!(spec.mode, Mode::Insert);
    }

    #[test]
    fn insert_segment_without_filepath_is_rejected() {
        let spec = JobSpec::from_json(
            r#"{"trackFile": "a.mp3", "segments": [{"positionMillis": 1000}]}"#,
        )
        .unwrap();
        let err = spec.markers().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn remove_segment_without_duration_is_rejected() {
        let spec = JobSpec::from_json(
            r#"{"trackFile": "a.mp3", "mode": "remove", "segments": [{"positionMillis": 1000}]}"#,
        )
        .unwrap();
        assert!(spec.markers().is_err());
    }

    #[test]
    fn malformed_json_is_validation_error() {
        let err = JobSpec::from_json("{ nope").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}

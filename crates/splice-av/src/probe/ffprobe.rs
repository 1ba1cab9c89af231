//! FFprobe-based prober.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the JSON output into [`AudioInfo`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use splice_core::{Error, Result};

use super::AudioInfo;
use crate::command::ToolCommand;

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    /// Path to the ffprobe binary.
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
        }
    }

    /// Probe `path` and return its audio properties.
    ///
    /// # Errors
    ///
    /// [`Error::MediaProbe`] when the file does not exist, ffprobe fails, its
    /// output cannot be parsed, or no positive duration is reported.
    pub async fn probe(&self, path: &Path) -> Result<AudioInfo> {
        if !path.is_file() {
            return Err(Error::MediaProbe(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(self.timeout).args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());

        let output = cmd.execute().await.map_err(|e| {
            Error::MediaProbe(format!("ffprobe failed on {}: {e}", path.display()))
        })?;

        let info = parse_ffprobe_json(&output.stdout)
            .map_err(|e| Error::MediaProbe(format!("{}: {e}", path.display())))?;
        tracing::debug!(
            path = %path.display(),
            duration_secs = info.duration_secs,
            codec = ?info.codec,
            "probed"
        );
        Ok(info)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
    bit_rate: Option<String>,
    duration: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse the JSON report of ffprobe into an [`AudioInfo`].
///
/// The duration comes from the first audio stream, falling back to the
/// container duration. A missing, unparseable, or non-positive duration is
/// an error, as is a report with no audio stream.
pub fn parse_ffprobe_json(json: &str) -> Result<AudioInfo> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::MediaProbe(format!("ffprobe JSON parse error: {e}")))?;
    parse_ffprobe_output(output)
}

fn parse_ffprobe_output(output: FfprobeOutput) -> Result<AudioInfo> {
    let audio = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or_else(|| Error::MediaProbe("no audio stream found".into()))?;

    let format_duration = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_secs);
    let duration_secs = audio
        .duration
        .as_deref()
        .and_then(parse_secs)
        .or(format_duration)
        .ok_or_else(|| Error::MediaProbe("duration is missing or invalid".into()))?;

    let bitrate = audio
        .bit_rate
        .as_deref()
        .or_else(|| output.format.as_ref().and_then(|f| f.bit_rate.as_deref()))
        .and_then(|s| s.parse::<u64>().ok());

    Ok(AudioInfo {
        duration_secs,
        channels: audio.channels,
        sample_rate: audio.sample_rate.as_deref().and_then(|s| s.parse().ok()),
        bitrate,
        codec: audio.codec_name.clone(),
    })
}

/// A positive, finite number of seconds (ffprobe prints `N/A` when unknown).
fn parse_secs(s: &str) -> Option<f64> {
    s.parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MP3_REPORT: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "mp3",
                "codec_type": "audio",
                "sample_rate": "44100",
                "channels": 2,
                "bit_rate": "128000",
                "duration": "90.044082"
            }
        ],
        "format": {
            "filename": "episode.mp3",
            "format_name": "mp3",
            "duration": "90.044082",
            "bit_rate": "128117"
        }
    }"#;

    #[test]
    fn parses_audio_stream() {
        let info = parse_ffprobe_json(MP3_REPORT).unwrap();
        assert!((info.duration_secs - 90.044082).abs() < 1e-9);
        assert_eq!(info.duration_ms(), 90_044);
        assert_eq!(info.channels, Some(2));
        assert_eq!(info.sample_rate, Some(44_100));
        assert_eq!(info.bitrate, Some(128_000));
        assert_eq!(info.codec.as_deref(), Some("mp3"));
    }

    #[test]
    fn falls_back_to_format_duration() {
        let json = r#"{
            "streams": [{"codec_type": "audio", "codec_name": "aac", "duration": "N/A"}],
            "format": {"duration": "12.5", "bit_rate": "96000"}
        }"#;
        let info = parse_ffprobe_json(json).unwrap();
        assert_eq!(info.duration_ms(), 12_500);
        assert_eq!(info.bitrate, Some(96_000));
    }

    #[test]
    fn missing_duration_is_probe_error() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        let err = parse_ffprobe_json(json).unwrap_err();
        assert!(matches!(err, Error::MediaProbe(_)));
    }

    #[test]
    fn zero_duration_is_probe_error() {
        let json = r#"{"streams": [{"codec_type": "audio", "duration": "0.000000"}], "format": {"duration": "0"}}"#;
        assert!(parse_ffprobe_json(json).is_err());
    }

    #[test]
    fn video_only_is_probe_error() {
        let json = r#"{"streams": [{"codec_type": "video", "duration": "10"}], "format": {"duration": "10"}}"#;
        let err = parse_ffprobe_json(json).unwrap_err();
        assert!(err.to_string().contains("no audio stream"));
    }

    #[test]
    fn garbage_is_probe_error() {
        assert!(matches!(
            parse_ffprobe_json("not json"),
            Err(Error::MediaProbe(_))
        ));
    }

    #[tokio::test]
    async fn probing_missing_file_fails_before_running_tool() {
        let prober = FfprobeProber::new(
            PathBuf::from("nonexistent_ffprobe_xyz"),
            Duration::from_secs(1),
        );
        let err = prober
            .probe(Path::new("/nonexistent/episode.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MediaProbe(ref m) if m.contains("does not exist")));
    }
}

//! Audio file probing.
//!
//! [`FfprobeProber`] shells out to ffprobe and reduces its JSON report to an
//! [`AudioInfo`]: the handful of properties the splicing pipeline needs.

pub mod ffprobe;

pub use self::ffprobe::{parse_ffprobe_json, FfprobeProber};

use serde::{Deserialize, Serialize};

/// Properties of a probed audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    /// Duration in seconds; always positive.
    pub duration_secs: f64,
    pub channels: Option<u32>,
    pub sample_rate: Option<u32>,
    /// Bits per second.
    pub bitrate: Option<u64>,
    pub codec: Option<String>,
}

impl AudioInfo {
    /// Duration rounded to whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.duration_secs * 1000.0).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_ms_rounds() {
        let info = AudioInfo {
            duration_secs: 90.0004,
            channels: Some(2),
            sample_rate: Some(44_100),
            bitrate: None,
            codec: None,
        };
        assert_eq!(info.duration_ms(), 90_000);
        let info = AudioInfo {
            duration_secs: 4.9996,
            ..info
        };
        assert_eq!(info.duration_ms(), 5_000);
    }
}

//! Application configuration types.
//!
//! The top-level [`Config`] struct carries the sub-configs for tools, the
//! job workspace, the artifact cache, remote retrieval and stitching. Every
//! section defaults sensibly so a completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::media::Strategy;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub workspace: WorkspaceConfig,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub stitch: StitchConfig,
}

impl Config {
    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (name, path) in [
            ("tools.ffmpeg_path", &self.tools.ffmpeg_path),
            ("tools.ffprobe_path", &self.tools.ffprobe_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!("{name} {} does not exist", p.display()));
                }
            }
        }

        if self.tools.timeout_secs == 0 {
            warnings.push("tools.timeout_secs is 0; tool runs will time out immediately".into());
        }

        if let Some(ref dir) = self.workspace.temp_dir {
            if !dir.is_dir() {
                warnings.push(format!(
                    "workspace.temp_dir {} is not a directory",
                    dir.display()
                ));
            }
        }

        if self.cache.key_prefix.trim_matches('/').is_empty() {
            warnings.push("cache.key_prefix is empty; artifacts land in the store root".into());
        }
        if self.cache.key_prefix.contains("..") {
            warnings.push(format!(
                "cache.key_prefix '{}' contains '..'",
                self.cache.key_prefix
            ));
        }

        if self.fetch.timeout_secs == 0 {
            warnings.push("fetch.timeout_secs is 0; every download will time out".into());
        }

        let ext = self.stitch.output_extension.as_str();
        if ext.is_empty() || ext.contains('.') || ext.contains('/') {
            warnings.push(format!(
                "stitch.output_extension '{ext}' should be a bare extension such as mp3"
            ));
        }

        if self.stitch.job_timeout_secs == Some(0) {
            warnings.push("stitch.job_timeout_secs is 0; set it to null to disable".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths to external CLI tools and how long a single run may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_tool_timeout() -> u64 {
    600
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            timeout_secs: default_tool_timeout(),
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where job temp directories are created. `None` uses the system temp dir.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub temp_dir: Option<PathBuf>,
    /// Leave each freshly stitched file in `temp_dir` after the job.
    pub keep_output: bool,
}

/// Artifact cache and store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Root directory of the local artifact store.
    pub root: PathBuf,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    "v1-stitched".into()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("./data/artifacts"),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Remote source retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// Extra attempts after a connect or timeout failure.
    pub retries: u32,
    /// Expiry applied when the response carries no caching headers.
    #[serde(default = "default_expiry_hours")]
    pub default_expiry_hours: u64,
    pub user_agent: Option<String>,
}

fn default_fetch_timeout() -> u64 {
    10
}
fn default_expiry_hours() -> u64 {
    6
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            retries: 2,
            default_expiry_hours: default_expiry_hours(),
            user_agent: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Stitching defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    pub strategy: Strategy,
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
    /// Wall-clock limit for one job; `None` disables it.
    pub job_timeout_secs: Option<u64>,
    /// Allowed gap between the expected and the measured output duration.
    #[serde(default = "default_duration_tolerance_ms")]
    pub duration_tolerance_ms: u64,
    /// Fail the job, instead of warning, when the gap exceeds the tolerance.
    pub strict_duration: bool,
}

fn default_output_extension() -> String {
    "mp3".into()
}

fn default_duration_tolerance_ms() -> u64 {
    100
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Concat,
            output_extension: default_output_extension(),
            job_timeout_secs: None,
            duration_tolerance_ms: default_duration_tolerance_ms(),
            strict_duration: false,
        }
    }
}

impl StitchConfig {
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.key_prefix, "v1-stitched");
        assert_eq!(cfg.fetch.timeout_secs, 10);
        assert_eq!(cfg.fetch.default_expiry_hours, 6);
        assert_eq!(cfg.stitch.strategy, Strategy::Concat);
        assert_eq!(cfg.stitch.output_extension, "mp3");
        assert!(cfg.stitch.job_timeout().is_none());
        assert_eq!(cfg.stitch.duration_tolerance_ms, 100);
        assert!(!cfg.stitch.strict_duration);
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = Config::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn missing_tool_path_warns() {
        let mut cfg = Config::default();
        cfg.tools.ffmpeg_path = Some(PathBuf::from("/nonexistent/ffmpeg"));
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("tools.ffmpeg_path")));
    }

    #[test]
    fn dotted_extension_warns() {
        let mut cfg = Config::default();
        cfg.stitch.output_extension = ".mp3".into();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("output_extension")));
    }

    #[test]
    fn zero_job_timeout_warns() {
        let mut cfg = Config::default();
        cfg.stitch.job_timeout_secs = Some(0);
        assert!(cfg.validate().iter().any(|w| w.contains("job_timeout_secs")));
    }

    #[test]
    fn partial_json_uses_section_defaults() {
        let cfg: Config =
            serde_json::from_str(r#"{"stitch": {"strategy": "filter-graph"}, "fetch": {"retries": 0}}"#)
                .unwrap();
        assert_eq!(cfg.stitch.strategy, Strategy::FilterGraph);
        assert_eq!(cfg.stitch.output_extension, "mp3");
        assert_eq!(cfg.stitch.duration_tolerance_ms, 100);
        assert_eq!(cfg.fetch.retries, 0);
        assert_eq!(cfg.fetch.timeout_secs, 10);
    }
}

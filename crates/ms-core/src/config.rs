//! JSON configuration.
//!
//! Every section is `#[serde(default)]`, so `{}` is a complete config and a
//! file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::ids::MediaId;
use crate::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub libraries: Vec<LibraryConfig>,
    pub media: MediaConfig,
    pub watch: WatchConfig,
    pub jobs: JobsConfig,
    pub tools: ToolsConfig,
    pub assets: AssetsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    ///
    /// Extension lists are normalized (lowercase, no leading dot) after
    /// parsing.
    pub fn from_json(json_str: &str) -> Result<Self> {
        let mut cfg: Config = serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))?;
        cfg.media.normalize();
        Ok(cfg)
    }

    /// Read and parse a configuration file, surfacing every failure.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Like [`Config::load`], but never fails: a missing file or a parse
    /// error yields the defaults, logged at info and warn respectively.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(Error::Io { source }) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unusable config file, using defaults");
                Self::default()
            }
        }
    }

    /// Problems worth reporting that do not stop the engine from starting.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.database.path.as_os_str().is_empty() {
            warnings.push("database.path is empty".into());
        }

        for (i, lib) in self.libraries.iter().enumerate() {
            if lib.name.trim().is_empty() {
                warnings.push(format!("libraries[{i}].name is empty"));
            }
            if lib.paths.is_empty() {
                warnings.push(format!("libraries[{i}] has no paths"));
            }
            for (j, p) in lib.paths.iter().enumerate() {
                if !p.is_absolute() {
                    warnings.push(format!(
                        "libraries[{i}].paths[{j}] '{}' is not absolute",
                        p.display()
                    ));
                }
            }
        }

        if self.media.video_extensions.is_empty() {
            warnings.push("media.video_extensions is empty; nothing will be scanned".into());
        }

        if self.jobs.scan_batch_size == 0 {
            warnings.push("jobs.scan_batch_size is 0; a batch size of 1 will be used".into());
        }

        if self.tools.timeout_secs == 0 {
            warnings.push("tools.timeout_secs is 0; external tools will time out immediately".into());
        }

        warnings
    }
}

/// SQLite database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/mediasync.db"),
        }
    }
}

/// A library and the filesystem roots that belong to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub name: String,
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

/// File extension allow-lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub video_extensions: Vec<String>,
    pub image_extensions: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            video_extensions: crate::media::DEFAULT_VIDEO_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            image_extensions: crate::media::DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl MediaConfig {
    /// Lowercase every extension and strip a leading dot.
    pub fn normalize(&mut self) {
        for list in [&mut self.video_extensions, &mut self.image_extensions] {
            for ext in list.iter_mut() {
                *ext = crate::media::normalize_extension(ext);
            }
            list.retain(|e| !e.is_empty());
        }
    }
}

/// File-system watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// What to do with jobs left `in_progress` by a previous process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleJobPolicy {
    /// Move them to `cancelled`.
    #[default]
    Cancel,
    /// Reset them to `not_started` so they run again.
    Requeue,
}

/// Job runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub enabled: bool,
    pub scan_on_startup: bool,
    pub stale_job_policy: StaleJobPolicy,
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,
}

fn default_scan_batch_size() -> usize {
    50
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_on_startup: false,
            stale_job_policy: StaleJobPolicy::default(),
            scan_batch_size: default_scan_batch_size(),
        }
    }
}

/// Paths to external CLI tools and the invocation timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_tool_timeout() -> u64 {
    300
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

/// Generated asset storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub dir: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/assets"),
        }
    }
}

impl AssetsConfig {
    /// Where the thumbnail for `media_id` is written.
    pub fn thumbnail_path(&self, media_id: MediaId) -> PathBuf {
        self.dir.join("thumbnails").join(format!("{media_id}.jpg"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.database.path, PathBuf::from("./data/mediasync.db"));
        assert!(cfg.libraries.is_empty());
        assert!(cfg.watch.enabled);
        assert!(cfg.jobs.enabled);
        assert!(!cfg.jobs.scan_on_startup);
        assert_eq!(cfg.jobs.stale_job_policy, StaleJobPolicy::Cancel);
        assert_eq!(cfg.jobs.scan_batch_size, 50);
        assert_eq!(cfg.tools.timeout_secs, 300);
        assert!(cfg.media.video_extensions.contains(&"mp4".to_string()));
        assert!(cfg.media.image_extensions.contains(&"webp".to_string()));
    }

    #[test]
    fn default_config_no_warnings() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.jobs.scan_batch_size, 50);
        assert!(cfg.watch.enabled);
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{
            "libraries": [{"name": "Movies", "paths": ["/media/movies"]}],
            "jobs": {"stale_job_policy": "requeue", "scan_batch_size": 10},
            "tools": {"timeout_secs": 5}
        }"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.libraries.len(), 1);
        assert_eq!(cfg.libraries[0].paths, vec![PathBuf::from("/media/movies")]);
        assert_eq!(cfg.jobs.stale_job_policy, StaleJobPolicy::Requeue);
        assert_eq!(cfg.jobs.scan_batch_size, 10);
        assert_eq!(cfg.tools.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn extensions_are_normalized() {
        let json = r#"{"media": {"video_extensions": [".MP4", "Mkv", ""]}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.media.video_extensions, vec!["mp4", "mkv"]);
    }

    #[test]
    fn invalid_json_is_validation_error() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn relative_library_path_warns() {
        let mut cfg = Config::default();
        cfg.libraries.push(LibraryConfig {
            name: "Movies".into(),
            paths: vec![PathBuf::from("movies")],
        });
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("not absolute")));
    }

    #[test]
    fn zero_timeout_warns() {
        let mut cfg = Config::default();
        cfg.tools.timeout_secs = 0;
        assert!(cfg.validate().iter().any(|w| w.contains("timeout_secs")));
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/config.json")));
        assert_eq!(cfg.jobs.scan_batch_size, 50);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = Config::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn thumbnail_path_layout() {
        let assets = AssetsConfig {
            dir: PathBuf::from("/data/assets"),
        };
        let id = MediaId::new();
        assert_eq!(
            assets.thumbnail_path(id),
            PathBuf::from(format!("/data/assets/thumbnails/{id}.jpg"))
        );
    }
}

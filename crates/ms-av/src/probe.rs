//! Media probing.
//!
//! [`FfprobeProber`] shells out to `ffprobe -v quiet -print_format json
//! -show_format -show_streams` and reduces the output to a [`ProbeReport`].
//! Fields that are missing or unparseable default to zero with a warning;
//! only a failed invocation or non-JSON output is an error.

use std::path::Path;

use async_trait::async_trait;
use ms_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::tools::{Tool, ToolConfig, ToolRegistry};

/// What the engine needs to know about a media file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub size_bytes: u64,
}

impl ProbeReport {
    /// Duration truncated to whole seconds.
    pub fn runtime_secs(&self) -> u64 {
        if self.duration_secs.is_finite() && self.duration_secs > 0.0 {
            self.duration_secs as u64
        } else {
            0
        }
    }
}

/// Something that can inspect a media file.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    async fn probe(&self, path: &Path) -> Result<ProbeReport>;
}

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    tool: ToolConfig,
}

impl FfprobeProber {
    pub fn new(tool: ToolConfig) -> Self {
        Self { tool }
    }

    /// Use the registry's ffprobe, or the bare name when it was not found.
    pub fn from_registry(registry: &ToolRegistry) -> Self {
        Self::new(registry.resolve(Tool::Ffprobe))
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(&self, path: &Path) -> Result<ProbeReport> {
        let mut cmd = self.tool.command();
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path);

        let stdout = cmd.run().await?;
        let report = parse_ffprobe_output(&String::from_utf8_lossy(&stdout))?;
        tracing::debug!(path = %path.display(), ?report, "probed");
        Ok(report)
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
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    disposition: FfprobeDisposition,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

/// Reduce raw ffprobe JSON to a [`ProbeReport`].
pub fn parse_ffprobe_output(json: &str) -> Result<ProbeReport> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let mut report = ProbeReport::default();

    // Cover art shows up as a video stream flagged attached_pic.
    let video = ff
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video") && s.disposition.attached_pic == 0);
    match video {
        Some(stream) => {
            report.width = stream.width.unwrap_or_else(|| {
                tracing::warn!("video stream has no width; defaulting to 0");
                0
            });
            report.height = stream.height.unwrap_or_else(|| {
                tracing::warn!("video stream has no height; defaulting to 0");
                0
            });
        }
        None => tracing::warn!("no video stream found; dimensions default to 0"),
    }

    let format = ff.format.unwrap_or(FfprobeFormat {
        duration: None,
        size: None,
    });
    report.duration_secs = parse_field("duration", format.duration.as_deref());
    report.size_bytes = parse_field("size", format.size.as_deref());

    Ok(report)
}

fn parse_field<T>(name: &str, raw: Option<&str>) -> T
where
    T: std::str::FromStr + Default,
{
    match raw.map(str::trim) {
        Some(s) => s.parse().unwrap_or_else(|_| {
            tracing::warn!(field = name, value = s, "unparseable probe field; defaulting to 0");
            T::default()
        }),
        None => {
            tracing::warn!(field = name, "missing probe field; defaulting to 0");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_video_stream_and_format() {
        let json = r#"{
            "streams": [
                {"codec_type": "audio", "channels": 2},
                {"codec_type": "video", "width": 1920, "height": 1080},
                {"codec_type": "video", "width": 640, "height": 360}
            ],
            "format": {"duration": "120.480000", "size": "5000"}
        }"#;
        let report = parse_ffprobe_output(json).unwrap();
        assert_eq!(report.width, 1920);
        assert_eq!(report.height, 1080);
        assert!((report.duration_secs - 120.48).abs() < 1e-9);
        assert_eq!(report.runtime_secs(), 120);
        assert_eq!(report.size_bytes, 5000);
    }

    #[test]
    fn skips_attached_pictures() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "width": 300, "height": 300, "disposition": {"attached_pic": 1}},
                {"codec_type": "video", "width": 1280, "height": 720}
            ],
            "format": {"duration": "10", "size": "1"}
        }"#;
        let report = parse_ffprobe_output(json).unwrap();
        assert_eq!((report.width, report.height), (1280, 720));
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "N/A"}}"#;
        let report = parse_ffprobe_output(json).unwrap();
        assert_eq!(report, ProbeReport::default());
        assert_eq!(report.runtime_secs(), 0);
    }

    #[test]
    fn empty_object_is_all_zero() {
        assert_eq!(parse_ffprobe_output("{}").unwrap(), ProbeReport::default());
    }

    #[test]
    fn non_json_is_probe_error() {
        let err = parse_ffprobe_output("not json").unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
    }

    #[tokio::test]
    async fn missing_binary_fails_with_tool_error() {
        let registry = ToolRegistry::empty(std::time::Duration::from_secs(5))
            .with_path(Tool::Ffprobe, "/nonexistent/ffprobe_xyz".into());
        let prober = FfprobeProber::from_registry(&registry);
        let err = prober.probe(Path::new("/tmp/a.mp4")).await.unwrap_err();
        assert!(matches!(err, Error::Tool { .. }));
        assert_eq!(prober.name(), "ffprobe");
    }
}

//! Single-frame extraction with ffmpeg.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ms_core::{Error, Result};

use crate::tools::{Tool, ToolConfig, ToolRegistry};

/// One still image to capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRequest {
    pub source: PathBuf,
    pub output: PathBuf,
    pub timestamp_secs: u32,
    /// Target width; `0` keeps the aspect ratio relative to `height`.
    pub width: u32,
    /// Target height; `0` keeps the aspect ratio relative to `width`.
    pub height: u32,
}

/// Something that can write a frame of a video to an image file.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Write the requested frame to `request.output`, replacing any
    /// existing file.
    async fn extract_frame(&self, request: &FrameRequest) -> Result<()>;
}

/// Frame extraction backed by the `ffmpeg` CLI.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    tool: ToolConfig,
}

impl FfmpegFrameExtractor {
    pub fn new(tool: ToolConfig) -> Self {
        Self { tool }
    }

    /// Use the registry's ffmpeg, or the bare name when it was not found.
    pub fn from_registry(registry: &ToolRegistry) -> Self {
        Self::new(registry.resolve(Tool::Ffmpeg))
    }
}

/// ffmpeg arguments for a [`FrameRequest`].
///
/// `-ss` goes before `-i` so ffmpeg seeks by keyframe instead of decoding
/// up to the timestamp.
pub fn ffmpeg_args(request: &FrameRequest) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        request.timestamp_secs.to_string(),
        "-i".to_string(),
        request.source.to_string_lossy().to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
    ];

    if let Some(filter) = scale_filter(request.width, request.height) {
        args.push("-vf".to_string());
        args.push(filter);
    }

    args.push(request.output.to_string_lossy().to_string());
    args
}

fn scale_filter(width: u32, height: u32) -> Option<String> {
    let dim = |v: u32| if v == 0 { "-1".to_string() } else { v.to_string() };
    if width == 0 && height == 0 {
        None
    } else {
        Some(format!("scale={}:{}", dim(width), dim(height)))
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract_frame(&self, request: &FrameRequest) -> Result<()> {
        let mut cmd = self.tool.command();
        cmd.args(ffmpeg_args(request));
        cmd.run().await?;

        ensure_written(&request.output)?;
        tracing::debug!(
            source = %request.source.display(),
            output = %request.output.display(),
            timestamp = request.timestamp_secs,
            "frame extracted"
        );
        Ok(())
    }
}

/// ffmpeg can exit 0 without writing anything when seeking past the end.
fn ensure_written(output: &Path) -> Result<()> {
    match std::fs::metadata(output) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(Error::tool(
            "ffmpeg",
            format!("{} was written empty", output.display()),
        )),
        Err(_) => Err(Error::tool(
            "ffmpeg",
            format!("no frame written to {}", output.display()),
        )),
    }
}

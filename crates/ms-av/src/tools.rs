//! Locating ffmpeg and ffprobe.
//!
//! [`ToolRegistry::discover`] resolves each [`Tool`] once at startup, from a
//! configured path when it exists and from `PATH` otherwise. A tool that
//! cannot be found is not fatal: [`ToolRegistry::resolve`] still hands out a
//! config for the bare name, so only the jobs that need it fail.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ms_core::config::ToolsConfig;
use ms_core::{Error, Result};
use serde::Serialize;

use crate::command::ToolCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
}

impl Tool {
    pub const ALL: [Tool; 2] = [Tool::Ffmpeg, Tool::Ffprobe];

    /// Executable name searched for in `PATH`.
    pub fn binary(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
        }
    }

    fn configured_path(self, config: &ToolsConfig) -> Option<&Path> {
        match self {
            Tool::Ffmpeg => config.ffmpeg_path.as_deref(),
            Tool::Ffprobe => config.ffprobe_path.as_deref(),
        }
    }
}

/// A tool ready to run: where it lives and how long it may take.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Name used in logs and error messages.
    pub name: String,
    pub path: PathBuf,
    pub timeout: Duration,
}

impl ToolConfig {
    pub fn command(&self) -> ToolCommand {
        ToolCommand::for_tool(self)
    }
}

/// Result of [`ToolRegistry::status`], printed by `check-tools`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub tool: Tool,
    pub path: Option<PathBuf>,
    /// First line of `-version` output.
    pub version: Option<String>,
}

impl ToolStatus {
    pub fn available(&self) -> bool {
        self.path.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ToolRegistry {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    timeout: Duration,
}

impl ToolRegistry {
    /// A registry with nothing resolved.
    pub fn empty(timeout: Duration) -> Self {
        Self {
            ffmpeg: None,
            ffprobe: None,
            timeout,
        }
    }

    pub fn discover(config: &ToolsConfig) -> Self {
        let mut registry = Self::empty(config.timeout());
        for tool in Tool::ALL {
            let found = match tool.configured_path(config) {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(tool = tool.binary(), path = %p.display(), "configured tool path does not exist; searching PATH");
                    which::which(tool.binary()).ok()
                }
                None => which::which(tool.binary()).ok(),
            };
            match found {
                Some(path) => {
                    tracing::debug!(tool = tool.binary(), path = %path.display(), "tool found");
                    registry = registry.with_path(tool, path);
                }
                None => tracing::warn!(tool = tool.binary(), "tool not found; jobs that need it will fail"),
            }
        }
        registry
    }

    /// Pin `tool` to `path` without searching.
    pub fn with_path(mut self, tool: Tool, path: PathBuf) -> Self {
        *self.slot(tool) = Some(path);
        self
    }

    fn slot(&mut self, tool: Tool) -> &mut Option<PathBuf> {
        match tool {
            Tool::Ffmpeg => &mut self.ffmpeg,
            Tool::Ffprobe => &mut self.ffprobe,
        }
    }

    fn path(&self, tool: Tool) -> Option<&PathBuf> {
        match tool {
            Tool::Ffmpeg => self.ffmpeg.as_ref(),
            Tool::Ffprobe => self.ffprobe.as_ref(),
        }
    }

    fn config_for(&self, tool: Tool, path: PathBuf) -> ToolConfig {
        ToolConfig {
            name: tool.binary().to_string(),
            path,
            timeout: self.timeout,
        }
    }

    /// The resolved tool, or an error telling the user to install it.
    pub fn require(&self, tool: Tool) -> Result<ToolConfig> {
        self.path(tool)
            .map(|p| self.config_for(tool, p.clone()))
            .ok_or_else(|| Error::tool(tool.binary(), "not found; is it installed and in PATH?"))
    }

    /// The resolved tool, or the bare executable name if discovery failed.
    /// Running the latter fails with a spawn error at use time.
    pub fn resolve(&self, tool: Tool) -> ToolConfig {
        let path = self
            .path(tool)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(tool.binary()));
        self.config_for(tool, path)
    }

    /// Availability and version of every tool. Runs `-version` on each
    /// resolved binary under the same timeout as any other invocation.
    pub async fn status(&self) -> Vec<ToolStatus> {
        let mut statuses = Vec::with_capacity(Tool::ALL.len());
        for tool in Tool::ALL {
            let path = self.path(tool).cloned();
            let version = match &path {
                Some(p) => self.detect_version(tool, p.clone()).await,
                None => None,
            };
            statuses.push(ToolStatus {
                tool,
                path,
                version,
            });
        }
        statuses
    }

    async fn detect_version(&self, tool: Tool, path: PathBuf) -> Option<String> {
        let stdout = match self.config_for(tool, path).command().arg("-version").run().await {
            Ok(stdout) => stdout,
            Err(e) => {
                tracing::debug!(tool = tool.binary(), "version check failed: {e}");
                return None;
            }
        };
        String::from_utf8_lossy(&stdout)
            .lines()
            .next()
            .map(str::to_owned)
    }
}

//! Running ffmpeg/ffprobe under a deadline.
//!
//! Every invocation goes through [`ToolCommand::run`], which captures the
//! child's output and kills it once the tool's timeout expires so a stuck
//! decoder can never wedge the job runner.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use ms_core::{Error, Result};
use tokio::process::Command;

use crate::tools::ToolConfig;

/// Longest stderr excerpt carried into an error message.
const STDERR_EXCERPT: usize = 300;

#[derive(Debug, Clone)]
pub struct ToolCommand {
    name: String,
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn for_tool(tool: &ToolConfig) -> Self {
        Self {
            name: tool.name.clone(),
            program: tool.path.clone(),
            args: Vec::new(),
            timeout: tool.timeout,
        }
    }

    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run to completion and return stdout.
    ///
    /// Spawn failures, non-zero exits and timeouts all become
    /// [`Error::Tool`] naming the tool. A non-zero exit carries the last
    /// meaningful stderr line.
    pub async fn run(&self) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(tool = %self.name, args = ?self.args, "spawning tool");
        let child = cmd
            .spawn()
            .map_err(|e| Error::tool(&self.name, format!("failed to spawn: {e}")))?;

        // On timeout the wait future is dropped, and with it the child.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::tool(&self.name, format!("failed waiting for exit: {e}")));
            }
            Err(_) => {
                tracing::warn!(tool = %self.name, timeout = ?self.timeout, "tool timed out and was killed");
                return Err(Error::tool(
                    &self.name,
                    format!("timed out after {}s", self.timeout.as_secs_f64()),
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::tool(
                &self.name,
                format!("exited with {}: {}", output.status, stderr_excerpt(&stderr)),
            ));
        }
        Ok(output.stdout)
    }
}

/// ffmpeg prints its banner first and the actual failure last.
fn stderr_excerpt(stderr: &str) -> String {
    let line = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no error output");
    line.chars().take(STDERR_EXCERPT).collect()
}

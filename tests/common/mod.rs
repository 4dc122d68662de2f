//! Shared test harness for integration tests.
//!
//! [`TestHarness`] builds an [`EngineContext`] over an in-memory database,
//! a temporary library root listed in the config, and tool fakes that never
//! spawn a process.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ms_av::{FrameExtractor, FrameRequest, ProbeReport, Prober};
use ms_core::config::{Config, LibraryConfig};
use ms_core::events::EventBus;
use ms_core::{Error, Result};
use ms_db::models::LibraryPath;
use ms_db::pool::{init_memory_pool, PooledConnection};
use ms_engine::{EngineContext, RunnerTrigger};
use tempfile::TempDir;

/// Reports fixed metadata for every file.
pub struct FakeProber {
    pub report: ProbeReport,
}

impl FakeProber {
    pub fn with_runtime(duration_secs: f64) -> Self {
        Self {
            report: ProbeReport {
                width: 1280,
                height: 720,
                duration_secs,
                size_bytes: 0,
            },
        }
    }
}

#[async_trait]
impl Prober for FakeProber {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self, _path: &Path) -> Result<ProbeReport> {
        Ok(self.report)
    }
}

/// Always fails, like a missing ffprobe.
pub struct BrokenProber;

#[async_trait]
impl Prober for BrokenProber {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn probe(&self, _path: &Path) -> Result<ProbeReport> {
        Err(Error::tool("ffprobe", "failed to spawn: not installed"))
    }
}

/// Writes a placeholder image and remembers every request.
#[derive(Default)]
pub struct RecordingFrames {
    pub requests: Mutex<Vec<FrameRequest>>,
}

#[async_trait]
impl FrameExtractor for RecordingFrames {
    async fn extract_frame(&self, request: &FrameRequest) -> Result<()> {
        std::fs::write(&request.output, b"jpeg")?;
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

pub struct TestHarness {
    pub ctx: EngineContext,
    pub frames: Arc<RecordingFrames>,
    trigger: Option<RunnerTrigger>,
    dir: TempDir,
}

impl TestHarness {
    /// Harness with a two-minute 720p fake prober.
    pub fn new() -> Self {
        Self::with_prober(Arc::new(FakeProber::with_runtime(120.0)))
    }

    pub fn with_prober(prober: Arc<dyn Prober>) -> Self {
        Self::build(prober, |_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        Self::build(Arc::new(FakeProber::with_runtime(120.0)), tweak)
    }

    fn build(prober: Arc<dyn Prober>, tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("media");
        std::fs::create_dir(&root).expect("create root");

        let mut config = Config::default();
        config.assets.dir = dir.path().join("assets");
        config.libraries.push(LibraryConfig {
            name: "Movies".into(),
            paths: vec![root],
        });
        tweak(&mut config);

        let frames = Arc::new(RecordingFrames::default());
        let (ctx, trigger) = EngineContext::new(
            init_memory_pool().expect("failed to create in-memory pool"),
            Arc::new(config),
            Arc::new(EventBus::default()),
            prober,
            frames.clone(),
        );

        Self {
            ctx,
            frames,
            trigger: Some(trigger),
            dir,
        }
    }

    pub fn conn(&self) -> PooledConnection {
        self.ctx.db.get().expect("connection")
    }

    /// The configured library root on disk.
    pub fn root(&self) -> PathBuf {
        self.dir.path().join("media")
    }

    pub fn take_trigger(&mut self) -> RunnerTrigger {
        self.trigger.take().expect("trigger already taken")
    }

    /// Register the configured libraries and return the single root.
    pub fn library_path(&self) -> LibraryPath {
        let conn = self.conn();
        let mut roots =
            ms_engine::bootstrap::ensure_library_paths(&conn, &self.ctx.config.libraries)
                .expect("bootstrap");
        roots.remove(0)
    }

    pub fn write_file(&self, relative: &str, bytes: usize) -> PathBuf {
        let path = self.root().join(relative.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, vec![0u8; bytes]).expect("write file");
        path
    }
}

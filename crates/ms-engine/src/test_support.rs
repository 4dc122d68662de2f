//! In-process fixtures for unit tests: an in-memory catalog, a temporary
//! library root and tool fakes that never spawn a process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ms_av::{FrameExtractor, FrameRequest, ProbeReport, Prober};
use ms_core::config::{Config, LibraryConfig};
use ms_core::events::EventBus;
use ms_core::Result;
use ms_db::models::{LibraryPath, MediaRecord, NewMedia};
use ms_db::pool::{init_memory_pool, PooledConnection};
use ms_db::queries::{libraries, library_paths, media};
use tempfile::TempDir;

use crate::context::EngineContext;
use crate::jobs::runner::RunnerTrigger;

/// Reports a 1080p, two-minute video for every path.
pub struct FakeProber;

#[async_trait]
impl Prober for FakeProber {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self, _path: &Path) -> Result<ProbeReport> {
        Ok(ProbeReport {
            width: 1920,
            height: 1080,
            duration_secs: 120.5,
            size_bytes: 0,
        })
    }
}

/// Writes a few bytes to the requested output.
pub struct FakeFrames;

#[async_trait]
impl FrameExtractor for FakeFrames {
    async fn extract_frame(&self, request: &FrameRequest) -> Result<()> {
        std::fs::write(&request.output, b"jpeg")?;
        Ok(())
    }
}

pub struct TestEngine {
    pub ctx: EngineContext,
    trigger: Option<RunnerTrigger>,
    dir: TempDir,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Like [`Self::new`], with the library root also listed in the config.
    pub fn with_configured_root() -> Self {
        Self::build(true)
    }

    fn build(configure_root: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("library");
        std::fs::create_dir(&root).unwrap();

        let mut config = Config::default();
        config.assets.dir = dir.path().join("assets");
        if configure_root {
            config.libraries.push(LibraryConfig {
                name: "Test".into(),
                paths: vec![root],
            });
        }

        let (ctx, trigger) = EngineContext::new(
            init_memory_pool().unwrap(),
            Arc::new(config),
            Arc::new(EventBus::default()),
            Arc::new(FakeProber),
            Arc::new(FakeFrames),
        );
        Self {
            ctx,
            trigger: Some(trigger),
            dir,
        }
    }

    pub fn conn(&self) -> PooledConnection {
        self.ctx.db.get().unwrap()
    }

    pub fn root_dir(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    pub fn take_trigger(&mut self) -> RunnerTrigger {
        self.trigger.take().unwrap()
    }

    /// The library path for [`Self::root_dir`], created on first use.
    pub fn add_root(&self) -> LibraryPath {
        let conn = self.conn();
        let lib = libraries::get_or_create_library(&conn, "Test").unwrap();
        library_paths::get_or_create_library_path(&conn, lib.id, &self.root_dir()).unwrap()
    }

    /// Insert an active record at `/<file_name>` without touching the disk.
    pub fn insert_media(&self, file_name: &str, size_bytes: i64) -> MediaRecord {
        let lp = self.add_root();
        media::create_media(
            &self.conn(),
            &NewMedia {
                library_path_id: lp.id,
                relative_path: format!("/{file_name}"),
                file_name: file_name.to_string(),
                title: ms_core::media::title_from_file_name(file_name),
                size_bytes,
            },
        )
        .unwrap()
        .unwrap()
    }
}

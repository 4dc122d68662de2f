//! ms-engine: keeps the media catalog in step with the filesystem.
//!
//! - [`scanner`] walks library roots
//! - [`reconciler`] diffs a walk against the catalog
//! - [`jobs`] holds the single-worker runner and its handlers
//! - [`watcher`] turns filesystem events into catalog changes and jobs
//! - [`bootstrap`] registers configured libraries
//!
//! [`start`] runs the runner and the watcher until a shutdown signal;
//! [`run_once`] performs a single scan-and-drain pass.

pub mod bootstrap;
pub mod context;
pub mod jobs;
pub mod reconciler;
pub mod scanner;
pub mod watcher;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use ms_av::{FfmpegFrameExtractor, FfprobeProber, ToolRegistry};
use ms_core::config::Config;
use ms_core::events::EventBus;
use ms_core::{Error, JobPayload, LibraryPathId, Result};
use ms_db::models::Job;
use ms_db::pool::{get_conn, DbPool};
use ms_db::queries::library_paths;
use tokio_util::sync::CancellationToken;

pub use context::EngineContext;
pub use jobs::runner::{DrainSummary, RunnerHandle, RunnerTrigger};
pub use watcher::{DirectoryWatcher, WatcherHandle};

/// Open (or create) the catalog database named in the config.
pub fn open_database(config: &Config) -> Result<DbPool> {
    let db_path = &config.database.path;
    let existed = db_path.exists();
    let db = ms_db::pool::init_pool(db_path)?;
    if existed {
        tracing::info!("Database opened (existing) at {}", db_path.display());
    } else {
        tracing::info!("Database created (new) at {}", db_path.display());
    }
    Ok(db)
}

/// Discover ffmpeg/ffprobe and build a context around them.
pub async fn build_context(config: Config, db: DbPool) -> (EngineContext, RunnerTrigger) {
    let tools = ToolRegistry::discover(&config.tools);
    for status in tools.status().await {
        let tool = status.tool.binary();
        match (&status.path, &status.version) {
            (Some(path), version) => tracing::info!(
                tool,
                path = %path.display(),
                version = version.as_deref().unwrap_or("unknown"),
                "external tool available"
            ),
            (None, _) => tracing::warn!(tool, "external tool missing; probe and thumbnail jobs will fail"),
        }
    }

    EngineContext::new(
        db,
        Arc::new(config),
        Arc::new(EventBus::default()),
        Arc::new(FfprobeProber::from_registry(&tools)),
        Arc::new(FfmpegFrameExtractor::from_registry(&tools)),
    )
}

/// Ask for a scan of one library root.
///
/// Returns the new job, or `None` when a scan of that root is already
/// pending. The runner is signalled either way.
pub fn request_scan(ctx: &EngineContext, library_path_id: LibraryPathId) -> Result<Option<Job>> {
    let conn = get_conn(&ctx.db)?;
    if library_paths::get_library_path(&conn, library_path_id)?.is_none() {
        return Err(Error::missing(library_path_id));
    }
    let job = jobs::enqueue(ctx, &conn, &JobPayload::scan_path(library_path_id))?;
    drop(conn);
    ctx.runner.signal();
    Ok(job)
}

/// Totals from [`run_once`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub library_paths: usize,
    pub recovered: usize,
    pub jobs: DrainSummary,
}

/// Bootstrap, recover, scan every root and drain the queue to idle,
/// including any follow-on jobs.
pub async fn sync_once(ctx: &EngineContext) -> Result<RunSummary> {
    let conn = get_conn(&ctx.db)?;
    let roots = bootstrap::ensure_library_paths(&conn, &ctx.config.libraries)?;
    drop(conn);

    let recovered = jobs::runner::recover(&ctx.db, ctx.config.jobs.stale_job_policy)?;

    let conn = get_conn(&ctx.db)?;
    let created = bootstrap::enqueue_scans(&conn, &roots)?;
    drop(conn);
    jobs::announce_all(ctx, &created);

    let summary = jobs::runner::drain(ctx, &CancellationToken::new()).await;
    Ok(RunSummary {
        library_paths: roots.len(),
        recovered,
        jobs: summary,
    })
}

/// One scan-and-drain pass with the real tools.
pub async fn run_once(config: Config) -> Result<RunSummary> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }
    let db = open_database(&config)?;
    let (ctx, _trigger) = build_context(config, db).await;
    sync_once(&ctx).await
}

/// Run the engine until SIGINT/SIGTERM.
///
/// Only an unusable database is fatal. A watcher that cannot start is
/// logged and skipped.
pub async fn start(config: Config) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let db = open_database(&config)?;
    let (ctx, trigger) = build_context(config, db).await;

    let conn = get_conn(&ctx.db)?;
    let roots = bootstrap::ensure_library_paths(&conn, &ctx.config.libraries)?;
    drop(conn);
    tracing::info!(roots = roots.len(), "Library roots registered");

    jobs::runner::recover(&ctx.db, ctx.config.jobs.stale_job_policy)?;

    if ctx.config.jobs.scan_on_startup {
        let conn = get_conn(&ctx.db)?;
        let created = bootstrap::enqueue_scans(&conn, &roots)?;
        drop(conn);
        jobs::announce_all(&ctx, &created);
    }

    let cancel = CancellationToken::new();

    let runner_handle = if ctx.config.jobs.enabled {
        let runner_ctx = ctx.clone();
        let runner_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            jobs::runner::run(runner_ctx, trigger, runner_cancel).await;
        });
        // Drain whatever an earlier run left behind.
        ctx.runner.signal();
        Some(handle)
    } else {
        tracing::info!("Job runner disabled");
        None
    };

    let watcher_handle = if ctx.config.watch.enabled {
        spawn_watcher(&ctx, roots, cancel.clone())
    } else {
        tracing::info!("File watcher disabled");
        None
    };

    shutdown_signal(cancel.clone()).await;
    tracing::info!("Shutdown signal received");
    cancel.cancel();

    if let Some(handle) = runner_handle {
        let _ = handle.await;
    }
    if let Some(handle) = watcher_handle {
        let _ = handle.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn spawn_watcher(
    ctx: &EngineContext,
    roots: Vec<ms_db::models::LibraryPath>,
    cancel: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    let (mut watcher, _handle) = match DirectoryWatcher::new(ctx.clone()) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!("Failed to create file watcher: {e}");
            return None;
        }
    };
    for root in roots {
        let path = root.path.clone();
        if let Err(e) = watcher.add_root(root) {
            tracing::warn!(root = %path.display(), "failed to watch library root: {e}");
        }
    }
    Some(tokio::spawn(watcher.run(cancel)))
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }
}

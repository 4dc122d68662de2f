//! Filesystem watcher.
//!
//! The OS watch primitive used here observes a single directory level, so
//! [`RecursiveWatch`] keeps one registration per directory and the watcher
//! extends it as directories appear and trims it as they disappear.
//!
//! The notify callback only forwards into unbounded channels and never
//! blocks. All work for an event (stat, scan, catalog writes) happens inside
//! the loop iteration that receives it. Each event is handled on its own; a
//! failure is logged and the loop moves on.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use ms_core::events::EventPayload;
use ms_core::media::{self, MediaKind};
use ms_core::{Error, JobPayload, Result};
use ms_db::models::{LibraryPath, MediaRecord, NewMedia};
use ms_db::pool::get_conn;
use ms_db::queries::media as media_q;
use rusqlite::Connection;

use crate::context::EngineContext;
use crate::jobs;
use crate::scanner;

// ---------------------------------------------------------------------------
// RecursiveWatch
// ---------------------------------------------------------------------------

/// Per-directory registrations emulating a recursive watch.
pub struct RecursiveWatch<W> {
    watcher: W,
    watched: HashSet<PathBuf>,
}

impl<W: Watcher> RecursiveWatch<W> {
    pub fn new(watcher: W) -> Self {
        Self {
            watcher,
            watched: HashSet::new(),
        }
    }

    /// Register `dir` and every directory beneath it that is not yet
    /// watched. Returns the number of new registrations.
    ///
    /// Failing to watch `dir` itself is an error; failures below it are
    /// logged and skipped.
    pub fn add_tree(&mut self, dir: &Path) -> Result<usize> {
        let mut added = 0;
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), "walk error while registering watches: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_dir() || self.watched.contains(entry.path()) {
                continue;
            }

            match self.watcher.watch(entry.path(), RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.watched.insert(entry.path().to_path_buf());
                    added += 1;
                }
                Err(e) if entry.depth() == 0 => {
                    return Err(Error::Internal(format!(
                        "failed to watch {}: {e}",
                        dir.display()
                    )));
                }
                Err(e) => {
                    tracing::warn!(dir = %entry.path().display(), "failed to watch directory: {e}");
                }
            }
        }
        Ok(added)
    }

    /// Drop the registrations for `dir` and everything beneath it.
    pub fn remove_tree(&mut self, dir: &Path) -> usize {
        let gone: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect();
        for path in &gone {
            // The OS usually drops the watch with the directory.
            if let Err(e) = self.watcher.unwatch(path) {
                tracing::debug!(dir = %path.display(), "unwatch: {e}");
            }
            self.watched.remove(path);
        }
        gone.len()
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A filesystem change the catalog cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Create(PathBuf),
    Remove(PathBuf),
}

impl FsEvent {
    pub fn path(&self) -> &Path {
        match self {
            FsEvent::Create(p) | FsEvent::Remove(p) => p,
        }
    }
}

/// Reduce a raw notify event to creates and removes.
///
/// A rename is a remove of the old path and a create of the new one. When
/// the backend cannot tell which side of a rename a path is on, the path's
/// current existence decides.
pub fn classify_event(event: &notify::Event) -> Vec<FsEvent> {
    let paths = event.paths.iter().cloned();
    match event.kind {
        EventKind::Create(_) => paths.map(FsEvent::Create).collect(),
        EventKind::Remove(_) => paths.map(FsEvent::Remove).collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => paths.map(FsEvent::Remove).collect(),
            RenameMode::To => paths.map(FsEvent::Create).collect(),
            RenameMode::Both if event.paths.len() >= 2 => vec![
                FsEvent::Remove(event.paths[0].clone()),
                FsEvent::Create(event.paths[1].clone()),
            ],
            _ => paths
                .map(|p| {
                    if p.exists() {
                        FsEvent::Create(p)
                    } else {
                        FsEvent::Remove(p)
                    }
                })
                .collect(),
        },
        _ => Vec::new(),
    }
}

/// Catalog changes caused by one [`FsEvent`].
#[derive(Debug, Default)]
pub struct EventOutcome {
    pub added: Vec<MediaRecord>,
    pub removed: Vec<MediaRecord>,
    /// Creates that matched an already active record.
    pub duplicates: usize,
    pub jobs_queued: usize,
}

// ---------------------------------------------------------------------------
// DirectoryWatcher
// ---------------------------------------------------------------------------

/// Requests accepted by a running watcher.
#[derive(Debug)]
pub enum WatcherCommand {
    AddRoot(LibraryPath),
}

/// Cloneable handle for talking to a running [`DirectoryWatcher`].
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    tx: mpsc::UnboundedSender<WatcherCommand>,
}

impl WatcherHandle {
    /// Start watching another library root. Returns `false` when the watcher
    /// has stopped.
    pub fn add_root(&self, root: LibraryPath) -> bool {
        self.tx.send(WatcherCommand::AddRoot(root)).is_ok()
    }
}

/// State touched by event handling, kept apart from the channels so the
/// loop can borrow both at once.
struct WatchState {
    ctx: EngineContext,
    watch: RecursiveWatch<RecommendedWatcher>,
    roots: Vec<LibraryPath>,
}

pub struct DirectoryWatcher {
    state: WatchState,
    events: mpsc::UnboundedReceiver<notify::Event>,
    errors: mpsc::UnboundedReceiver<notify::Error>,
    commands: mpsc::UnboundedReceiver<WatcherCommand>,
}

impl DirectoryWatcher {
    /// Create the OS watcher. No roots are registered yet.
    pub fn new(ctx: EngineContext) -> Result<(Self, WatcherHandle)> {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            // Receivers only go away during shutdown.
            match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(e) => {
                    let _ = error_tx.send(e);
                }
            }
        })
        .map_err(|e| Error::Internal(format!("failed to create file watcher: {e}")))?;

        let watcher = Self {
            state: WatchState {
                ctx,
                watch: RecursiveWatch::new(watcher),
                roots: Vec::new(),
            },
            events,
            errors,
            commands,
        };
        Ok((watcher, WatcherHandle { tx: command_tx }))
    }

    /// Watch `root` and all of its subdirectories.
    pub fn add_root(&mut self, root: LibraryPath) -> Result<usize> {
        self.state.add_root(root)
    }

    /// Apply one filesystem event to the catalog.
    pub fn handle_event(&mut self, event: FsEvent) -> Result<EventOutcome> {
        self.state.handle_event(event)
    }

    /// Number of directories currently registered.
    pub fn watched_dirs(&self) -> usize {
        self.state.watch.len()
    }

    /// Consume events until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let DirectoryWatcher {
            mut state,
            mut events,
            mut errors,
            mut commands,
        } = self;

        tracing::info!(
            roots = state.roots.len(),
            dirs = state.watch.len(),
            "File watcher started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(event) = events.recv() => {
                    for fs_event in classify_event(&event) {
                        let path = fs_event.path().to_path_buf();
                        if let Err(e) = state.handle_event(fs_event) {
                            tracing::warn!(path = %path.display(), "failed to handle filesystem event: {e}");
                        }
                    }
                }
                Some(err) = errors.recv() => {
                    tracing::warn!("file watcher error: {err}");
                }
                Some(command) = commands.recv() => match command {
                    WatcherCommand::AddRoot(root) => {
                        let path = root.path.clone();
                        if let Err(e) = state.add_root(root) {
                            tracing::warn!(root = %path.display(), "failed to watch library root: {e}");
                        }
                    }
                },
            }
        }

        tracing::info!("File watcher stopped");
    }
}

impl WatchState {
    fn add_root(&mut self, root: LibraryPath) -> Result<usize> {
        let added = self.watch.add_tree(&root.path)?;
        tracing::info!(root = %root.path.display(), dirs = added, "watching library root");
        if !self.roots.iter().any(|r| r.id == root.id) {
            self.roots.push(root);
        }
        Ok(added)
    }

    /// The most specific root containing `path`.
    fn root_for(&self, path: &Path) -> Option<LibraryPath> {
        self.roots
            .iter()
            .filter(|r| path.starts_with(&r.path))
            .max_by_key(|r| r.path.components().count())
            .cloned()
    }

    fn handle_event(&mut self, event: FsEvent) -> Result<EventOutcome> {
        let outcome = match event {
            FsEvent::Create(path) => self.handle_create(&path)?,
            FsEvent::Remove(path) => self.handle_remove(&path)?,
        };
        if outcome.jobs_queued > 0 {
            self.ctx.runner.signal();
        }
        Ok(outcome)
    }

    fn handle_create(&mut self, path: &Path) -> Result<EventOutcome> {
        let mut outcome = EventOutcome::default();
        let Some(root) = self.root_for(path) else {
            tracing::debug!(path = %path.display(), "event outside every library root; ignored");
            return Ok(outcome);
        };

        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            // Temp files are often gone again by the time we look.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "created path vanished before it was read");
                return Ok(outcome);
            }
            Err(e) => return Err(e.into()),
        };

        let conn = get_conn(&self.ctx.db)?;
        if meta.is_dir() {
            self.watch.add_tree(path)?;
            let scan = scanner::scan(path, &self.ctx.config.media.video_extensions);
            for file in scan.files {
                self.create_file(&conn, &root, &file.absolute_path, file.size_bytes, &mut outcome)?;
            }
        } else if meta.is_file() {
            let config = &self.ctx.config.media;
            match media::classify(path, &config.video_extensions, &config.image_extensions) {
                Some(MediaKind::Video) => {
                    self.create_file(&conn, &root, path, meta.len(), &mut outcome)?;
                }
                Some(MediaKind::Image) => {
                    tracing::debug!(path = %path.display(), "image file ignored");
                }
                None => {}
            }
        }

        Ok(outcome)
    }

    fn create_file(
        &self,
        conn: &Connection,
        root: &LibraryPath,
        path: &Path,
        size_bytes: u64,
        outcome: &mut EventOutcome,
    ) -> Result<()> {
        let Some(relative_path) = media::relative_path(&root.path, path) else {
            return Ok(());
        };

        // Only active records count; an earlier, removed record at the same
        // path stays as history and a fresh one is inserted.
        if media_q::find_active_media(conn, root.id, &relative_path)?.is_some() {
            tracing::debug!(path = %path.display(), "already catalogued; duplicate event ignored");
            outcome.duplicates += 1;
            return Ok(());
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let new = NewMedia {
            library_path_id: root.id,
            relative_path,
            title: media::title_from_file_name(&file_name),
            file_name,
            size_bytes: i64::try_from(size_bytes).unwrap_or(i64::MAX),
        };
        let Some(record) = media_q::create_media(conn, &new)? else {
            outcome.duplicates += 1;
            return Ok(());
        };

        tracing::info!(media_id = %record.id, path = %path.display(), "media added");
        self.ctx.event_bus.publish(EventPayload::MediaAdded {
            media_id: record.id,
            library_path_id: record.library_path_id,
            relative_path: record.relative_path.clone(),
        });

        for payload in [
            JobPayload::probe_media(record.id),
            JobPayload::generate_checksum(record.id),
        ] {
            if jobs::enqueue(&self.ctx, conn, &payload)?.is_some() {
                outcome.jobs_queued += 1;
            }
        }
        outcome.added.push(record);
        Ok(())
    }

    fn handle_remove(&mut self, path: &Path) -> Result<EventOutcome> {
        let mut outcome = EventOutcome::default();
        let Some(root) = self.root_for(path) else {
            return Ok(outcome);
        };
        let Some(relative_path) = media::relative_path(&root.path, path) else {
            return Ok(outcome);
        };

        let conn = get_conn(&self.ctx.db)?;
        let affected = media_q::list_active_media_under(&conn, root.id, &relative_path)?;
        if !affected.is_empty() {
            let ids: Vec<_> = affected.iter().map(|m| m.id).collect();
            media_q::mark_media_missing(&conn, &ids)?;
            for record in &affected {
                self.ctx.event_bus.publish(EventPayload::MediaRemoved {
                    media_id: record.id,
                    library_path_id: record.library_path_id,
                    relative_path: record.relative_path.clone(),
                });
            }
            tracing::info!(path = %path.display(), count = affected.len(), "media marked missing");
        }

        self.watch.remove_tree(path);
        outcome.removed = affected;
        Ok(outcome)
    }
}

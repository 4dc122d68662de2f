//! Full-tree reconciliation of one library path against the catalog.
//!
//! A pass walks the root, marks active records whose file disappeared as
//! missing, and inserts records for files the catalog has not seen. Records
//! that still match a file are left alone, so a second pass over an
//! unchanged tree writes nothing.

use std::collections::HashSet;

use ms_core::{media, Error, JobPayload, LibraryPathId, Result};
use ms_db::models::{Job, LibraryPath, MediaRecord, NewMedia};
use ms_db::queries::{jobs, media as media_q};
use rusqlite::Connection;

use crate::scanner::{self, ScanError};

/// Result of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Matching files seen on disk.
    pub files_found: usize,
    /// Records inserted by this pass.
    pub added: Vec<MediaRecord>,
    /// Records this pass marked as missing.
    pub removed: Vec<MediaRecord>,
    /// Entries the walk could not read.
    pub errors: Vec<ScanError>,
}

impl ReconcileReport {
    /// Number of catalog rows this pass changed.
    pub fn writes(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// Bring the records of `root` in line with what is on disk.
///
/// Inserts are flushed in transactions of at most `batch_size` rows. A root
/// that is not a directory (for example an unmounted drive) fails the pass
/// instead of marking every record missing.
pub fn reconcile(
    conn: &Connection,
    root: &LibraryPath,
    video_extensions: &[String],
    batch_size: usize,
) -> Result<ReconcileReport> {
    if !root.path.is_dir() {
        return Err(Error::not_found(
            "library root directory",
            root.path.display(),
        ));
    }

    let outcome = scanner::scan(&root.path, video_extensions);
    let mut report = ReconcileReport {
        files_found: outcome.files.len(),
        errors: outcome.errors,
        ..ReconcileReport::default()
    };

    let mut on_disk = HashSet::with_capacity(outcome.files.len());
    let mut candidates = Vec::new();
    for file in outcome.files {
        let Some(relative_path) = media::relative_path(&root.path, &file.absolute_path) else {
            tracing::warn!(
                path = %file.absolute_path.display(),
                root = %root.path.display(),
                "scanned file is outside its root; skipping"
            );
            continue;
        };
        on_disk.insert(relative_path.clone());
        candidates.push((relative_path, file));
    }

    // Missing files.
    let active = media_q::list_active_media(conn, root.id)?;
    let mut known = HashSet::with_capacity(active.len());
    let mut missing = Vec::new();
    for record in active {
        if on_disk.contains(&record.relative_path) {
            known.insert(record.relative_path.clone());
        } else {
            missing.push(record);
        }
    }
    if !missing.is_empty() {
        let ids: Vec<_> = missing.iter().map(|m| m.id).collect();
        media_q::mark_media_missing(conn, &ids)?;
        report.removed = missing;
    }

    // New files.
    let batch_size = batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);
    for (relative_path, file) in candidates {
        if known.contains(&relative_path) {
            continue;
        }
        batch.push(NewMedia {
            library_path_id: root.id,
            relative_path,
            file_name: file.file_name,
            title: file.name,
            size_bytes: i64::try_from(file.size_bytes).unwrap_or(i64::MAX),
        });
        if batch.len() >= batch_size {
            report.added.extend(media_q::create_media_batch(conn, &batch)?);
            batch.clear();
        }
    }
    if !batch.is_empty() {
        report.added.extend(media_q::create_media_batch(conn, &batch)?);
    }

    tracing::info!(
        library_path_id = %root.id,
        root = %root.path.display(),
        files = report.files_found,
        added = report.added.len(),
        removed = report.removed.len(),
        errors = report.errors.len(),
        "reconciled library path"
    );

    Ok(report)
}

/// Enqueue probe jobs for active records never probed and checksum jobs
/// for active records without a checksum.
///
/// Jobs already pending for a record are not duplicated. Returns the jobs
/// that were created.
pub fn schedule_enrichment(conn: &Connection, library_path_id: LibraryPathId) -> Result<Vec<Job>> {
    let mut created = Vec::new();

    for record in media_q::list_media_unprobed(conn, library_path_id)? {
        if let Some(job) = jobs::enqueue_unique(conn, &JobPayload::probe_media(record.id))? {
            created.push(job);
        }
    }
    for record in media_q::list_media_missing_checksum(conn, library_path_id)? {
        if let Some(job) = jobs::enqueue_unique(conn, &JobPayload::generate_checksum(record.id))? {
            created.push(job);
        }
    }

    Ok(created)
}

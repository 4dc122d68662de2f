//! ScanPath: reconcile one library path, then queue enrichment for what it
//! found.

use ms_core::events::EventPayload;
use ms_core::job::ScanPathPayload;
use ms_core::{Error, Result};
use ms_db::pool::get_conn;
use ms_db::queries::library_paths;

use crate::context::EngineContext;
use crate::jobs;
use crate::reconciler;

pub async fn run(ctx: &EngineContext, payload: ScanPathPayload) -> Result<()> {
    let conn = get_conn(&ctx.db)?;
    let root = library_paths::get_library_path(&conn, payload.library_path_id)?
        .ok_or_else(|| Error::missing(payload.library_path_id))?;
    drop(conn);

    // The walk and the batched inserts are blocking work.
    let db = ctx.db.clone();
    let extensions = ctx.config.media.video_extensions.clone();
    let batch_size = ctx.config.jobs.scan_batch_size;
    let scan_root = root.clone();
    let report = tokio::task::spawn_blocking(move || {
        let conn = get_conn(&db)?;
        reconciler::reconcile(&conn, &scan_root, &extensions, batch_size)
    })
    .await
    .map_err(|e| Error::Internal(format!("scan task failed: {e}")))??;

    // Notifications go out only after the rows are committed.
    for record in &report.removed {
        ctx.event_bus.publish(EventPayload::MediaRemoved {
            media_id: record.id,
            library_path_id: record.library_path_id,
            relative_path: record.relative_path.clone(),
        });
    }
    for record in &report.added {
        ctx.event_bus.publish(EventPayload::MediaAdded {
            media_id: record.id,
            library_path_id: record.library_path_id,
            relative_path: record.relative_path.clone(),
        });
    }
    ctx.event_bus.publish(EventPayload::LibraryScanComplete {
        library_path_id: root.id,
        files_found: report.files_found as u64,
        added: report.added.len() as u64,
        removed: report.removed.len() as u64,
        errors: report.errors.len() as u64,
    });

    let conn = get_conn(&ctx.db)?;
    let created = reconciler::schedule_enrichment(&conn, root.id)?;
    drop(conn);
    if !created.is_empty() {
        tracing::debug!(library_path_id = %root.id, count = created.len(), "enrichment jobs queued");
        jobs::announce_all(ctx, &created);
        ctx.runner.signal();
    }

    Ok(())
}

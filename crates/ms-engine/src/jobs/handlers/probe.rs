//! ProbeMedia: read dimensions and duration with the prober, then queue a
//! thumbnail when the record has none.

use ms_core::events::EventPayload;
use ms_core::job::MediaPayload;
use ms_core::{ImageRelation, JobPayload, Result};
use ms_db::pool::get_conn;
use ms_db::queries::{images, media};

use super::resolve_active;
use crate::context::EngineContext;
use crate::jobs;

pub async fn run(ctx: &EngineContext, payload: MediaPayload) -> Result<()> {
    let resolved = resolve_active(ctx, payload.media_id)?;
    let report = ctx.prober.probe(&resolved.path).await?;

    // Keep the size the scanner saw when the container does not report one.
    let size_bytes = if report.size_bytes > 0 {
        i64::try_from(report.size_bytes).unwrap_or(i64::MAX)
    } else {
        resolved.media.size_bytes
    };

    let conn = get_conn(&ctx.db)?;
    media::set_probe_metadata(
        &conn,
        payload.media_id,
        i64::from(report.width),
        i64::from(report.height),
        i64::try_from(report.runtime_secs()).unwrap_or(i64::MAX),
        size_bytes,
    )?;
    tracing::debug!(
        media_id = %payload.media_id,
        prober = ctx.prober.name(),
        width = report.width,
        height = report.height,
        runtime = report.runtime_secs(),
        "probe metadata stored"
    );
    ctx.event_bus.publish(EventPayload::MediaUpdated {
        media_id: payload.media_id,
    });

    if images::get_media_image(&conn, payload.media_id, ImageRelation::Thumbnail)?.is_none() {
        let output = ctx.config.assets.thumbnail_path(payload.media_id);
        let thumb = JobPayload::generate_thumbnail(payload.media_id, output);
        if jobs::enqueue(ctx, &conn, &thumb)?.is_some() {
            ctx.runner.signal();
        }
    }

    Ok(())
}

//! GenerateThumbnail: capture one frame and link it to the record as its
//! thumbnail image.

use ms_av::FrameRequest;
use ms_core::events::EventPayload;
use ms_core::job::ThumbnailPayload;
use ms_core::{Error, ImageRelation, Result};
use ms_db::pool::get_conn;
use ms_db::queries::images;

use super::resolve_active;
use crate::context::EngineContext;

/// Capture point when the payload leaves it unset: a quarter of the way in.
pub fn default_timestamp(runtime_secs: i64) -> u32 {
    if runtime_secs <= 0 {
        return 0;
    }
    u32::try_from(runtime_secs / 4).unwrap_or(u32::MAX)
}

fn dimension(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(0)
}

/// Resolve the payload's optional fields against the record.
pub(crate) fn frame_request(
    payload: &ThumbnailPayload,
    source: std::path::PathBuf,
    record: &ms_db::models::MediaRecord,
) -> FrameRequest {
    FrameRequest {
        source,
        output: payload.output_path.clone(),
        timestamp_secs: payload
            .timestamp_secs
            .unwrap_or_else(|| default_timestamp(record.runtime_secs)),
        width: payload.width.unwrap_or_else(|| dimension(record.width)),
        height: payload.height.unwrap_or_else(|| dimension(record.height)),
    }
}

pub async fn run(ctx: &EngineContext, payload: ThumbnailPayload) -> Result<()> {
    if payload.output_path.as_os_str().is_empty() {
        return Err(Error::Validation("thumbnail output path is empty".into()));
    }

    let resolved = resolve_active(ctx, payload.media_id)?;
    let request = frame_request(&payload, resolved.path, &resolved.media);

    if let Some(parent) = request.output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    ctx.frames.extract_frame(&request).await?;

    let conn = get_conn(&ctx.db)?;
    let output = request.output.to_string_lossy();
    let image = images::get_or_create_image(&conn, &resolved.media.title, &output)?;
    images::upsert_media_image(&conn, payload.media_id, image.id, ImageRelation::Thumbnail)?;

    tracing::debug!(
        media_id = %payload.media_id,
        output = %request.output.display(),
        timestamp = request.timestamp_secs,
        "thumbnail stored"
    );
    ctx.event_bus.publish(EventPayload::MediaUpdated {
        media_id: payload.media_id,
    });
    Ok(())
}

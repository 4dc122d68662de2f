//! Job handlers, one module per job type.
//!
//! Handlers re-read whatever they act on when they run, so a record that was
//! removed between enqueue and execution fails the job instead of being
//! acted on from a stale snapshot. Every output they write is overwritten on
//! a re-run.

pub mod checksum;
pub mod probe;
pub mod scan_path;
pub mod thumbnail;

use std::path::PathBuf;

use ms_core::{media, Error, JobPayload, MediaId, Result};
use ms_db::models::MediaRecord;
use ms_db::pool::get_conn;

use crate::context::EngineContext;

/// Run the handler for `payload`.
pub async fn dispatch(ctx: &EngineContext, payload: JobPayload) -> Result<()> {
    match payload {
        JobPayload::ScanPath(p) => scan_path::run(ctx, p).await,
        JobPayload::ProbeMedia(p) => probe::run(ctx, p).await,
        JobPayload::GenerateChecksum(p) => checksum::run(ctx, p).await,
        JobPayload::GenerateThumbnail(p) => thumbnail::run(ctx, p).await,
    }
}

/// An active media record and its absolute path on disk.
pub(crate) struct ResolvedMedia {
    pub media: MediaRecord,
    pub path: PathBuf,
}

pub(crate) fn resolve_active(ctx: &EngineContext, media_id: MediaId) -> Result<ResolvedMedia> {
    let conn = get_conn(&ctx.db)?;
    let (media, root) = ms_db::queries::media::get_media_with_root(&conn, media_id)?
        .ok_or_else(|| Error::missing(media_id))?;
    if !media.is_active() {
        return Err(Error::not_found("active media", media_id));
    }
    let path = media::absolute_path(&root.path, &media.relative_path);
    Ok(ResolvedMedia { media, path })
}

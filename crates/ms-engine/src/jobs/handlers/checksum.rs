//! GenerateChecksum: SHA-256 of the file contents, hex encoded.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use ms_core::events::EventPayload;
use ms_core::job::MediaPayload;
use ms_core::{Error, Result};
use ms_db::pool::get_conn;
use ms_db::queries::media;
use sha2::{Digest, Sha256};

use super::resolve_active;
use crate::context::EngineContext;

const READ_BUFFER_SIZE: usize = 64 * 1024;

pub async fn run(ctx: &EngineContext, payload: MediaPayload) -> Result<()> {
    let resolved = resolve_active(ctx, payload.media_id)?;

    let path = resolved.path.clone();
    let digest = tokio::task::spawn_blocking(move || file_sha256(&path))
        .await
        .map_err(|e| Error::Internal(format!("checksum task failed: {e}")))??;

    let conn = get_conn(&ctx.db)?;
    media::set_checksum(&conn, payload.media_id, &digest)?;
    tracing::debug!(media_id = %payload.media_id, path = %resolved.path.display(), "checksum stored");
    ctx.event_bus.publish(EventPayload::MediaUpdated {
        media_id: payload.media_id,
    });
    Ok(())
}

/// Stream a file through SHA-256.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestEngine;
    use assert_matches::assert_matches;

    #[test]
    fn known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn larger_than_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let data = vec![7u8; READ_BUFFER_SIZE * 2 + 11];
        std::fs::write(&path, &data).unwrap();
        assert_eq!(file_sha256(&path).unwrap(), hex::encode(Sha256::digest(&data)));
    }

    #[tokio::test]
    async fn stores_checksum_and_overwrites_on_rerun() {
        let engine = TestEngine::new();
        let record = engine.insert_media("a.mp4", 3);
        let file = engine.root_dir().join("a.mp4");
        std::fs::write(&file, b"abc").unwrap();

        run(&engine.ctx, MediaPayload { media_id: record.id })
            .await
            .unwrap();
        let first = media::get_media(&engine.conn(), record.id).unwrap().unwrap();
        assert_eq!(first.checksum.as_deref().map(str::len), Some(64));

        std::fs::write(&file, b"abcd").unwrap();
        run(&engine.ctx, MediaPayload { media_id: record.id })
            .await
            .unwrap();
        let second = media::get_media(&engine.conn(), record.id).unwrap().unwrap();
        assert_ne!(first.checksum, second.checksum);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let engine = TestEngine::new();
        let record = engine.insert_media("gone.mp4", 3);
        let err = run(&engine.ctx, MediaPayload { media_id: record.id })
            .await
            .unwrap_err();
        assert_matches!(err, Error::Io { .. });
    }
}

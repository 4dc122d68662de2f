//! Image and media-image relation operations.

use ms_core::{Error, ImageId, ImageRelation, MediaId, Result};
use rusqlite::Connection;

use crate::models::Image;

const COLS: &str = "id, name, path, created_at";

/// Fetch the image stored at `path`, creating it if absent.
///
/// Thumbnails are regenerated to the same path, so a re-run reuses the
/// existing row instead of piling up duplicates.
pub fn get_or_create_image(conn: &Connection, name: &str, path: &str) -> Result<Image> {
    if let Some(existing) = get_image_by_path(conn, path)? {
        return Ok(existing);
    }

    let id = ImageId::new();
    let now = super::now();
    conn.execute(
        "INSERT OR IGNORE INTO images (id, name, path, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id.to_string(), name, path, &now],
    )
    .map_err(Error::database)?;

    get_image_by_path(conn, path)?.ok_or_else(|| Error::not_found("image", path))
}

/// Get an image by its file path.
pub fn get_image_by_path(conn: &Connection, path: &str) -> Result<Option<Image>> {
    let q = format!("SELECT {COLS} FROM images WHERE path = ?1");
    match conn.query_row(&q, [path], Image::from_row) {
        Ok(i) => Ok(Some(i)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e)),
    }
}

/// Link an image to a media record. An existing link of the same relation
/// is replaced.
pub fn upsert_media_image(
    conn: &Connection,
    media_id: MediaId,
    image_id: ImageId,
    relation: ImageRelation,
) -> Result<()> {
    conn.execute(
        "INSERT INTO media_images (media_id, image_id, relation_type, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(media_id, relation_type) DO UPDATE SET image_id = excluded.image_id",
        rusqlite::params![
            media_id.to_string(),
            image_id.to_string(),
            relation.as_str(),
            super::now()
        ],
    )
    .map_err(Error::database)?;
    Ok(())
}

/// Resolve the image linked to a media record under `relation`.
pub fn get_media_image(
    conn: &Connection,
    media_id: MediaId,
    relation: ImageRelation,
) -> Result<Option<Image>> {
    let q = "SELECT i.id, i.name, i.path, i.created_at
             FROM media_images mi JOIN images i ON i.id = mi.image_id
             WHERE mi.media_id = ?1 AND mi.relation_type = ?2";
    match conn.query_row(
        q,
        rusqlite::params![media_id.to_string(), relation.as_str()],
        Image::from_row,
    ) {
        Ok(i) => Ok(Some(i)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e)),
    }
}

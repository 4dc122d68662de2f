//! Media catalog operations.
//!
//! A record is *active* when `file_exists = 1 AND deleted = 0`. Only active
//! records take part in the per-root path uniqueness guarantee, so inserts
//! use `INSERT OR IGNORE` and report a skipped row as `None`.

use ms_core::{Error, LibraryPathId, MediaId, Result};
use rusqlite::Connection;

use crate::models::{LibraryPath, MediaRecord, NewMedia};
use crate::queries::library_paths;

const COLS: &str = "id, library_path_id, relative_path, file_name, title, width, height,
    runtime_secs, size_bytes, checksum, file_exists, deleted, added_at, created_at, modified_at,
    probed_at";

const ACTIVE: &str = "file_exists = 1 AND deleted = 0";

const INSERT_SQL: &str = "INSERT OR IGNORE INTO media
    (id, library_path_id, relative_path, file_name, title, size_bytes,
     file_exists, deleted, added_at, created_at, modified_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 0, ?7, ?7, ?7)";

fn insert_one(conn: &Connection, new: &NewMedia, now: &str) -> Result<Option<MediaRecord>> {
    let id = MediaId::new();
    let mut stmt = conn
        .prepare_cached(INSERT_SQL)
        .map_err(Error::database)?;
    let n = stmt
        .execute(rusqlite::params![
            id.to_string(),
            new.library_path_id.to_string(),
            &new.relative_path,
            &new.file_name,
            &new.title,
            new.size_bytes,
            now,
        ])
        .map_err(Error::database)?;

    if n == 0 {
        return Ok(None);
    }

    Ok(Some(MediaRecord {
        id,
        library_path_id: new.library_path_id,
        relative_path: new.relative_path.clone(),
        file_name: new.file_name.clone(),
        title: new.title.clone(),
        width: 0,
        height: 0,
        runtime_secs: 0,
        size_bytes: new.size_bytes,
        checksum: None,
        exists: true,
        deleted: false,
        added_at: now.to_string(),
        created_at: now.to_string(),
        modified_at: now.to_string(),
        probed_at: None,
    }))
}

/// Insert a new active record.
///
/// Returns `None` when an active record already occupies the same
/// root-relative path.
pub fn create_media(conn: &Connection, new: &NewMedia) -> Result<Option<MediaRecord>> {
    insert_one(conn, new, &super::now())
}

/// Insert a batch of records in a single transaction.
///
/// Rows that collide with an active record are skipped; only the records
/// actually inserted are returned.
pub fn create_media_batch(conn: &Connection, batch: &[NewMedia]) -> Result<Vec<MediaRecord>> {
    let tx = conn
        .unchecked_transaction()
        .map_err(Error::database)?;

    let now = super::now();
    let mut created = Vec::with_capacity(batch.len());
    for new in batch {
        if let Some(record) = insert_one(&tx, new, &now)? {
            created.push(record);
        }
    }

    tx.commit().map_err(Error::database)?;
    Ok(created)
}

/// Get a media record by ID.
pub fn get_media(conn: &Connection, id: MediaId) -> Result<Option<MediaRecord>> {
    let q = format!("SELECT {COLS} FROM media WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], MediaRecord::from_row) {
        Ok(m) => Ok(Some(m)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e)),
    }
}

/// Get a media record together with the root it lives under.
pub fn get_media_with_root(
    conn: &Connection,
    id: MediaId,
) -> Result<Option<(MediaRecord, LibraryPath)>> {
    let Some(media) = get_media(conn, id)? else {
        return Ok(None);
    };
    let root = library_paths::get_library_path(conn, media.library_path_id)?
        .ok_or_else(|| Error::missing(media.library_path_id))?;
    Ok(Some((media, root)))
}

/// Find the active record at an exact root-relative path.
pub fn find_active_media(
    conn: &Connection,
    library_path_id: LibraryPathId,
    relative_path: &str,
) -> Result<Option<MediaRecord>> {
    let q = format!(
        "SELECT {COLS} FROM media
         WHERE library_path_id = ?1 AND relative_path = ?2 AND {ACTIVE}"
    );
    match conn.query_row(
        &q,
        rusqlite::params![library_path_id.to_string(), relative_path],
        MediaRecord::from_row,
    ) {
        Ok(m) => Ok(Some(m)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e)),
    }
}

fn query_list(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<MediaRecord>> {
    let mut stmt = conn.prepare(sql).map_err(Error::database)?;
    let rows = stmt
        .query_map(params, MediaRecord::from_row)
        .map_err(Error::database)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::database)?;
    Ok(rows)
}

/// List every active record of a root.
pub fn list_active_media(
    conn: &Connection,
    library_path_id: LibraryPathId,
) -> Result<Vec<MediaRecord>> {
    let q = format!(
        "SELECT {COLS} FROM media WHERE library_path_id = ?1 AND {ACTIVE}
         ORDER BY relative_path"
    );
    query_list(conn, &q, &[&library_path_id.to_string()])
}

/// List active records at `prefix` or beneath it.
///
/// Matching is per path segment: `/shows` matches `/shows` and
/// `/shows/e01.mkv` but not `/showsXYZ.mkv`. A prefix of `/` matches the
/// whole root.
pub fn list_active_media_under(
    conn: &Connection,
    library_path_id: LibraryPathId,
    prefix: &str,
) -> Result<Vec<MediaRecord>> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return list_active_media(conn, library_path_id);
    }

    let q = format!(
        "SELECT {COLS} FROM media
         WHERE library_path_id = ?1 AND {ACTIVE}
           AND (relative_path = ?2
                OR substr(relative_path, 1, length(?2) + 1) = ?2 || '/')
         ORDER BY relative_path"
    );
    query_list(conn, &q, &[&library_path_id.to_string(), &prefix])
}

/// Active records of a root that have not been checksummed yet.
pub fn list_media_missing_checksum(
    conn: &Connection,
    library_path_id: LibraryPathId,
) -> Result<Vec<MediaRecord>> {
    let q = format!(
        "SELECT {COLS} FROM media
         WHERE library_path_id = ?1 AND {ACTIVE} AND checksum IS NULL
         ORDER BY created_at, rowid"
    );
    query_list(conn, &q, &[&library_path_id.to_string()])
}

/// Active records of a root that no probe has succeeded on yet.
///
/// A record probed as 0x0 (no video stream) is not listed again.
pub fn list_media_unprobed(
    conn: &Connection,
    library_path_id: LibraryPathId,
) -> Result<Vec<MediaRecord>> {
    let q = format!(
        "SELECT {COLS} FROM media
         WHERE library_path_id = ?1 AND {ACTIVE} AND probed_at IS NULL
         ORDER BY created_at, rowid"
    );
    query_list(conn, &q, &[&library_path_id.to_string()])
}

/// Mark a set of records as gone from disk in one transaction.
///
/// Returns how many rows actually changed.
pub fn mark_media_missing(conn: &Connection, ids: &[MediaId]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(Error::database)?;
    let now = super::now();
    let mut changed = 0;
    {
        let mut stmt = tx
            .prepare_cached(
                "UPDATE media SET file_exists = 0, modified_at = ?1
                 WHERE id = ?2 AND file_exists = 1",
            )
            .map_err(Error::database)?;
        for id in ids {
            changed += stmt
                .execute(rusqlite::params![&now, id.to_string()])
                .map_err(Error::database)?;
        }
    }
    tx.commit().map_err(Error::database)?;
    Ok(changed)
}

/// Store a content checksum, overwriting any earlier value.
pub fn set_checksum(conn: &Connection, id: MediaId, checksum: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE media SET checksum = ?1, modified_at = ?2 WHERE id = ?3",
            rusqlite::params![checksum, super::now(), id.to_string()],
        )
        .map_err(Error::database)?;
    Ok(n > 0)
}

/// Store probed metadata and mark the record as probed.
pub fn set_probe_metadata(
    conn: &Connection,
    id: MediaId,
    width: i64,
    height: i64,
    runtime_secs: i64,
    size_bytes: i64,
) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE media SET width = ?1, height = ?2, runtime_secs = ?3, size_bytes = ?4,
                modified_at = ?5, probed_at = ?5
             WHERE id = ?6",
            rusqlite::params![
                width,
                height,
                runtime_secs,
                size_bytes,
                super::now(),
                id.to_string()
            ],
        )
        .map_err(Error::database)?;
    Ok(n > 0)
}

/// Count every record of a root, active or not.
pub fn count_media(conn: &Connection, library_path_id: LibraryPathId) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM media WHERE library_path_id = ?1",
        [library_path_id.to_string()],
        |row| row.get(0),
    )
    .map_err(Error::database)
}

/// List every record at a root-relative path, newest first, including
/// inactive history.
pub fn list_media_at_path(
    conn: &Connection,
    library_path_id: LibraryPathId,
    relative_path: &str,
) -> Result<Vec<MediaRecord>> {
    let q = format!(
        "SELECT {COLS} FROM media WHERE library_path_id = ?1 AND relative_path = ?2
         ORDER BY created_at DESC, rowid DESC"
    );
    query_list(conn, &q, &[&library_path_id.to_string(), &relative_path])
}

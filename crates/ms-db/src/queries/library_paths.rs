//! Library root operations.

use std::path::Path;

use ms_core::{Error, LibraryId, LibraryPathId, Result};
use rusqlite::Connection;

use crate::models::LibraryPath;

const COLS: &str = "id, library_id, path, created_at";

/// Fetch the root registered at `path`, creating it under `library_id` if
/// absent. An existing root keeps its original library.
pub fn get_or_create_library_path(
    conn: &Connection,
    library_id: LibraryId,
    path: &Path,
) -> Result<LibraryPath> {
    let path_str = path.to_string_lossy().into_owned();
    if let Some(existing) = get_library_path_by_path(conn, path)? {
        return Ok(existing);
    }

    let id = LibraryPathId::new();
    let now = super::now();
    conn.execute(
        "INSERT OR IGNORE INTO library_paths (id, library_id, path, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id.to_string(), library_id.to_string(), &path_str, &now],
    )
    .map_err(Error::database)?;

    get_library_path_by_path(conn, path)?
        .ok_or_else(|| Error::not_found("library path", path.display()))
}

/// Get a library root by ID.
pub fn get_library_path(conn: &Connection, id: LibraryPathId) -> Result<Option<LibraryPath>> {
    let q = format!("SELECT {COLS} FROM library_paths WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], LibraryPath::from_row) {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e)),
    }
}

/// Get a library root by its filesystem path.
pub fn get_library_path_by_path(conn: &Connection, path: &Path) -> Result<Option<LibraryPath>> {
    let q = format!("SELECT {COLS} FROM library_paths WHERE path = ?1");
    match conn.query_row(&q, [path.to_string_lossy().into_owned()], LibraryPath::from_row) {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e)),
    }
}

/// List every registered root.
pub fn list_library_paths(conn: &Connection) -> Result<Vec<LibraryPath>> {
    let q = format!("SELECT {COLS} FROM library_paths ORDER BY path");
    let mut stmt = conn.prepare(&q).map_err(Error::database)?;
    let rows = stmt
        .query_map([], LibraryPath::from_row)
        .map_err(Error::database)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::database)?;
    Ok(rows)
}

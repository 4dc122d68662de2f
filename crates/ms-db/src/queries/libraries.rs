//! Library CRUD operations.

use ms_core::{Error, LibraryId, Result};
use rusqlite::Connection;

use crate::models::Library;

const COLS: &str = "id, name, created_at";

/// Fetch a library by name, creating it if absent.
pub fn get_or_create_library(conn: &Connection, name: &str) -> Result<Library> {
    if let Some(existing) = get_library_by_name(conn, name)? {
        return Ok(existing);
    }

    let id = LibraryId::new();
    let now = super::now();
    conn.execute(
        "INSERT OR IGNORE INTO libraries (id, name, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![id.to_string(), name, &now],
    )
    .map_err(Error::database)?;

    get_library_by_name(conn, name)?.ok_or_else(|| Error::not_found("library", name))
}

/// Get a library by its unique name.
pub fn get_library_by_name(conn: &Connection, name: &str) -> Result<Option<Library>> {
    let q = format!("SELECT {COLS} FROM libraries WHERE name = ?1");
    match conn.query_row(&q, [name], Library::from_row) {
        Ok(l) => Ok(Some(l)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;

    #[test]
    fn get_or_create_is_stable() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let a = get_or_create_library(&conn, "Movies").unwrap();
        let b = get_or_create_library(&conn, "Movies").unwrap();
        assert_eq!(a.id, b.id);

        let fetched = get_library_by_name(&conn, "Movies").unwrap().unwrap();
        assert_eq!(fetched.id, a.id);
    }

    #[test]
    fn missing_library_is_none() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        assert!(get_library_by_name(&conn, "Nope").unwrap().is_none());
    }
}

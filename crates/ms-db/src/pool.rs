//! SQLite connection pooling.
//!
//! The job runner, the watcher and one-off CLI commands each borrow a
//! connection for a short unit of work. WAL mode lets a scan's batched
//! inserts proceed while the watcher reads.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use ms_core::{Error, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const POOL_SIZE: u32 = 4;

const FILE_PRAGMAS: &str = "PRAGMA foreign_keys = ON;
     PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;
     PRAGMA busy_timeout = 5000;";

const MEMORY_PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

/// Open the catalog at `db_path`, creating the file and its parent
/// directory if needed, and bring the schema up to date.
pub fn init_pool(db_path: &Path) -> Result<DbPool> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let manager =
        SqliteConnectionManager::file(db_path).with_init(|c| c.execute_batch(FILE_PRAGMAS));
    let pool = build_and_migrate(manager)?;
    tracing::debug!(path = %db_path.display(), "catalog database ready");
    Ok(pool)
}

/// A private in-memory catalog.
///
/// Connections of one pool share a single database through SQLite's
/// shared cache; every call gets a fresh name so pools never see each
/// other's rows.
pub fn init_memory_pool() -> Result<DbPool> {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let uri = format!(
        "file:mediasync_mem_{}_{}?mode=memory&cache=shared",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    );
    let manager = SqliteConnectionManager::file(uri).with_init(|c| c.execute_batch(MEMORY_PRAGMAS));
    build_and_migrate(manager)
}

fn build_and_migrate(manager: SqliteConnectionManager) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(POOL_SIZE)
        .build(manager)
        .map_err(|e| Error::database(format!("failed to open connection pool: {e}")))?;
    // Holding this connection also keeps an in-memory database alive.
    let conn = get_conn(&pool)?;
    migrations::run_migrations(&conn)?;
    drop(conn);
    Ok(pool)
}

pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("no database connection available: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pragma<T: rusqlite::types::FromSql>(conn: &PooledConnection, name: &str) -> T {
        conn.query_row(&format!("PRAGMA {name}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn memory_pool_enforces_foreign_keys() {
        let pool = init_memory_pool().unwrap();
        assert_eq!(pool.max_size(), POOL_SIZE);
        let conn = get_conn(&pool).unwrap();
        assert_eq!(pragma::<i64>(&conn, "foreign_keys"), 1);
    }

    #[test]
    fn memory_pools_are_isolated() {
        let a = init_memory_pool().unwrap();
        let b = init_memory_pool().unwrap();
        get_conn(&a)
            .unwrap()
            .execute(
                "INSERT INTO libraries (id, name, created_at) VALUES ('x', 'A', 'now')",
                [],
            )
            .unwrap();
        let count: i64 = get_conn(&b)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM libraries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn connections_of_one_memory_pool_share_rows() {
        let pool = init_memory_pool().unwrap();
        let writer = get_conn(&pool).unwrap();
        let reader = get_conn(&pool).unwrap();
        writer
            .execute(
                "INSERT INTO libraries (id, name, created_at) VALUES ('x', 'A', 'now')",
                [],
            )
            .unwrap();
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM libraries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn file_pool_uses_wal_and_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");
        let pool = init_pool(&path).unwrap();
        let conn = get_conn(&pool).unwrap();
        assert_eq!(pragma::<String>(&conn, "journal_mode").to_lowercase(), "wal");
        assert!(path.exists());
    }
}

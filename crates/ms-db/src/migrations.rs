//! Catalog schema.
//!
//! Each version is a SQL batch compiled into the binary. Applied versions are
//! recorded in `schema_migrations`; a version is applied at most once and in
//! its own transaction, so a failed upgrade leaves the previous schema intact.

use ms_core::{Error, Result};
use rusqlite::Connection;

/// V1: initial schema -- libraries, roots, media catalog and images.
const V1_INITIAL: &str = r#"
CREATE TABLE libraries (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE library_paths (
    id         TEXT PRIMARY KEY,
    library_id TEXT NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
    path       TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE media (
    id              TEXT PRIMARY KEY,
    library_path_id TEXT NOT NULL REFERENCES library_paths(id) ON DELETE CASCADE,
    relative_path   TEXT NOT NULL,
    file_name       TEXT NOT NULL,
    title           TEXT NOT NULL,
    width           INTEGER NOT NULL DEFAULT 0,
    height          INTEGER NOT NULL DEFAULT 0,
    runtime_secs    INTEGER NOT NULL DEFAULT 0,
    size_bytes      INTEGER NOT NULL DEFAULT 0,
    checksum        TEXT,
    file_exists     INTEGER NOT NULL DEFAULT 1,
    deleted         INTEGER NOT NULL DEFAULT 0,
    added_at        TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    modified_at     TEXT NOT NULL
);
CREATE INDEX idx_media_library_path ON media(library_path_id);
-- At most one active record per root-relative path.
CREATE UNIQUE INDEX idx_media_active_path
    ON media(library_path_id, relative_path)
    WHERE file_exists = 1 AND deleted = 0;

CREATE TABLE images (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    path       TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE media_images (
    media_id      TEXT NOT NULL REFERENCES media(id) ON DELETE CASCADE,
    image_id      TEXT NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    PRIMARY KEY (media_id, relation_type)
);
"#;

/// V2: durable job queue.
const V2_JOBS: &str = r#"
CREATE TABLE jobs (
    id           TEXT PRIMARY KEY,
    job_type     TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'not_started',
    payload      TEXT NOT NULL,
    subject_id   TEXT,
    error        TEXT,
    created_at   TEXT NOT NULL,
    modified_at  TEXT NOT NULL,
    started_at   TEXT,
    completed_at TEXT
);
CREATE INDEX idx_jobs_status_created ON jobs(status, created_at);
CREATE INDEX idx_jobs_subject ON jobs(job_type, subject_id);
"#;

/// V3: remember when a record was probed, whatever the probe found.
const V3_PROBED_AT: &str = "ALTER TABLE media ADD COLUMN probed_at TEXT;";

const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL), (2, V2_JOBS), (3, V3_PROBED_AT)];

const TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

/// Bring `conn` up to the latest schema version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(TRACKING_TABLE)
        .map_err(|e| Error::database(format!("cannot create schema_migrations: {e}")))?;

    let current = schema_version(conn)?;
    let pending = MIGRATIONS.iter().filter(|(v, _)| *v > current);
    for &(version, sql) in pending {
        apply(conn, version, sql)?;
        tracing::info!(version, "catalog schema upgraded");
    }
    Ok(())
}

/// Highest applied version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(Error::database)
}

fn apply(conn: &Connection, version: i64, sql: &str) -> Result<()> {
    let tx = conn.unchecked_transaction().map_err(Error::database)?;
    tx.execute_batch(sql)
        .map_err(|e| Error::database(format!("schema version {version} failed: {e}")))?;
    tx.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [version])
        .map_err(Error::database)?;
    tx.commit().map_err(Error::database)
}

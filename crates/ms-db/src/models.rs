//! Catalog rows as typed structs.
//!
//! `from_row` reads columns by position, in the order of the `COLS` list of
//! the query module that selects them.

use std::path::PathBuf;

use ms_core::{
    EntityId, ImageId, JobId, JobPayload, JobStatus, JobType, LibraryId, LibraryPathId, MediaId,
    Result,
};
use uuid::Uuid;

fn parse_id<T: EntityId>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(T::from_uuid(uuid))
}

fn parse_status(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<JobStatus> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: ms_core::Error| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[derive(Debug, Clone)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub created_at: String,
}

impl Library {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        })
    }
}

/// A watched filesystem root belonging to a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPath {
    pub id: LibraryPathId,
    pub library_id: LibraryId,
    pub path: PathBuf,
    pub created_at: String,
}

impl LibraryPath {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let path: String = row.get(2)?;
        Ok(Self {
            id: parse_id(row, 0)?,
            library_id: parse_id(row, 1)?,
            path: PathBuf::from(path),
            created_at: row.get(3)?,
        })
    }
}

/// Catalog entry for one discovered file.
#[derive(Debug, Clone)]
pub struct MediaRecord {
    pub id: MediaId,
    pub library_path_id: LibraryPathId,
    pub relative_path: String,
    pub file_name: String,
    pub title: String,
    pub width: i64,
    pub height: i64,
    pub runtime_secs: i64,
    pub size_bytes: i64,
    pub checksum: Option<String>,
    pub exists: bool,
    pub deleted: bool,
    pub added_at: String,
    pub created_at: String,
    pub modified_at: String,
    /// Set by the first successful probe, even one that found no video
    /// stream.
    pub probed_at: Option<String>,
}

impl MediaRecord {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            library_path_id: parse_id(row, 1)?,
            relative_path: row.get(2)?,
            file_name: row.get(3)?,
            title: row.get(4)?,
            width: row.get(5)?,
            height: row.get(6)?,
            runtime_secs: row.get(7)?,
            size_bytes: row.get(8)?,
            checksum: row.get(9)?,
            exists: row.get(10)?,
            deleted: row.get(11)?,
            added_at: row.get(12)?,
            created_at: row.get(13)?,
            modified_at: row.get(14)?,
            probed_at: row.get(15)?,
        })
    }

    /// Present on disk and not soft-deleted.
    pub fn is_active(&self) -> bool {
        self.exists && !self.deleted
    }
}

/// Fields needed to insert a new media record.
#[derive(Debug, Clone)]
pub struct NewMedia {
    pub library_path_id: LibraryPathId,
    pub relative_path: String,
    pub file_name: String,
    pub title: String,
    pub size_bytes: i64,
}

/// A persisted job row.
///
/// `job_type` is kept as the raw tag so a row written by a newer build can
/// still be claimed and then failed cleanly instead of being unreadable.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub status: JobStatus,
    pub payload: String,
    pub subject_id: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub modified_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl Job {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            job_type: row.get(1)?,
            status: parse_status(row, 2)?,
            payload: row.get(3)?,
            subject_id: row.get(4)?,
            error: row.get(5)?,
            created_at: row.get(6)?,
            modified_at: row.get(7)?,
            started_at: row.get(8)?,
            completed_at: row.get(9)?,
        })
    }

    pub fn kind(&self) -> Result<JobType> {
        self.job_type.parse()
    }

    /// Decode the stored payload according to the job's type tag.
    pub fn decode_payload(&self) -> Result<JobPayload> {
        JobPayload::decode(self.kind()?, &self.payload)
    }
}

#[derive(Debug, Clone)]
pub struct Image {
    pub id: ImageId,
    pub name: String,
    pub path: String,
    pub created_at: String,
}

impl Image {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            name: row.get(1)?,
            path: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

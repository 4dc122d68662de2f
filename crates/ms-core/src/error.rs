//! Unified error type for mediasync.
//!
//! All crates funnel their failures into [`Error`]. A failed job stores the
//! rendered message, so every variant reads as a complete log line.

use std::fmt;

use crate::ids::{EntityId, JobId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A lookup by id or by natural key (path, name) found nothing.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {source}")]
    Database {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("i/o error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// ffmpeg or ffprobe failed to spawn, exited non-zero or timed out.
    #[error("{tool}: {message}")]
    Tool { tool: String, message: String },

    /// Tool output could not be understood.
    #[error("probe error: {0}")]
    Probe(String),

    #[error("job {job_id}: {message}")]
    Job { job_id: JobId, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// No row exists for `id`.
    pub fn missing<I: EntityId>(id: I) -> Self {
        Error::NotFound {
            entity: I::ENTITY,
            key: id.to_string(),
        }
    }

    /// Lookup by a non-id key, e.g. a library path by its directory.
    pub fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        Error::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn job(job_id: JobId, message: impl Into<String>) -> Self {
        Error::Job {
            job_id,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

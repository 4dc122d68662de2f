//! Background job types, statuses and strongly-typed payloads.
//!
//! A job row stores its type tag and a JSON payload. The payload is decoded
//! exactly once, when the runner claims the job, via [`JobPayload::decode`];
//! handlers only ever see the typed variant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ids::{LibraryPathId, MediaId};

// ---------------------------------------------------------------------------
// JobType
// ---------------------------------------------------------------------------

/// Kind of background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ScanPath,
    ProbeMedia,
    GenerateChecksum,
    GenerateThumbnail,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScanPath => "scan_path",
            Self::ProbeMedia => "probe_media",
            Self::GenerateChecksum => "generate_checksum",
            Self::GenerateThumbnail => "generate_thumbnail",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scan_path" => Ok(Self::ScanPath),
            "probe_media" => Ok(Self::ProbeMedia),
            "generate_checksum" => Ok(Self::GenerateChecksum),
            "generate_thumbnail" => Ok(Self::GenerateThumbnail),
            other => Err(Error::Validation(format!("unknown job type '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
///
/// `NotStarted -> InProgress -> {Done, Failed}`; `Cancelled` is reachable
/// from `NotStarted` or `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    NotStarted,
    InProgress,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        Self::NotStarted,
        Self::InProgress,
        Self::Done,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the job will never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::InProgress)
                | (Self::InProgress, Self::Done)
                | (Self::InProgress, Self::Failed)
                | (Self::NotStarted, Self::Cancelled)
                | (Self::InProgress, Self::Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::Validation(format!("unknown job status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPathPayload {
    pub library_path_id: LibraryPathId,
}

/// Payload shared by jobs that act on a single media record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub media_id: MediaId,
}

/// Thumbnail request. Unset fields are derived from the media record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailPayload {
    pub media_id: MediaId,
    pub output_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

/// A job payload, one variant per [`JobType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPayload {
    ScanPath(ScanPathPayload),
    ProbeMedia(MediaPayload),
    GenerateChecksum(MediaPayload),
    GenerateThumbnail(ThumbnailPayload),
}

impl JobPayload {
    pub fn scan_path(library_path_id: LibraryPathId) -> Self {
        Self::ScanPath(ScanPathPayload { library_path_id })
    }

    pub fn probe_media(media_id: MediaId) -> Self {
        Self::ProbeMedia(MediaPayload { media_id })
    }

    pub fn generate_checksum(media_id: MediaId) -> Self {
        Self::GenerateChecksum(MediaPayload { media_id })
    }

    /// Thumbnail with timestamp and dimensions left to the handler.
    pub fn generate_thumbnail(media_id: MediaId, output_path: PathBuf) -> Self {
        Self::GenerateThumbnail(ThumbnailPayload {
            media_id,
            output_path,
            timestamp_secs: None,
            height: None,
            width: None,
        })
    }

    pub fn job_type(&self) -> JobType {
        match self {
            Self::ScanPath(_) => JobType::ScanPath,
            Self::ProbeMedia(_) => JobType::ProbeMedia,
            Self::GenerateChecksum(_) => JobType::GenerateChecksum,
            Self::GenerateThumbnail(_) => JobType::GenerateThumbnail,
        }
    }

    /// The entity this job acts on, used to de-duplicate pending jobs.
    pub fn subject_id(&self) -> String {
        match self {
            Self::ScanPath(p) => p.library_path_id.to_string(),
            Self::ProbeMedia(p) | Self::GenerateChecksum(p) => p.media_id.to_string(),
            Self::GenerateThumbnail(p) => p.media_id.to_string(),
        }
    }

    /// Serialize the variant body to the JSON stored in the job row.
    pub fn to_json(&self) -> Result<String> {
        let encoded = match self {
            Self::ScanPath(p) => serde_json::to_string(p),
            Self::ProbeMedia(p) | Self::GenerateChecksum(p) => serde_json::to_string(p),
            Self::GenerateThumbnail(p) => serde_json::to_string(p),
        };
        encoded.map_err(|e| Error::Internal(format!("encode job payload: {e}")))
    }

    /// Decode a stored payload according to its type tag.
    pub fn decode(job_type: JobType, json: &str) -> Result<Self> {
        let invalid =
            |e: serde_json::Error| Error::Validation(format!("invalid {job_type} payload: {e}"));
        Ok(match job_type {
            JobType::ScanPath => Self::ScanPath(serde_json::from_str(json).map_err(invalid)?),
            JobType::ProbeMedia => Self::ProbeMedia(serde_json::from_str(json).map_err(invalid)?),
            JobType::GenerateChecksum => {
                Self::GenerateChecksum(serde_json::from_str(json).map_err(invalid)?)
            }
            JobType::GenerateThumbnail => {
                Self::GenerateThumbnail(serde_json::from_str(json).map_err(invalid)?)
            }
        })
    }
}

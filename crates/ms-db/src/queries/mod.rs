//! Database query modules.

pub mod images;
pub mod jobs;
pub mod libraries;
pub mod library_paths;
pub mod media;

use chrono::{SecondsFormat, Utc};

/// Current time as stored in every timestamp column.
///
/// Microsecond precision keeps `ORDER BY created_at` meaningful for rows
/// inserted in quick succession.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

//! Register configured libraries and their roots in the catalog.

use ms_core::config::LibraryConfig;
use ms_core::{JobPayload, Result};
use ms_db::models::{Job, LibraryPath};
use ms_db::queries::{jobs, libraries, library_paths};
use rusqlite::Connection;

/// Get-or-create every configured library and root.
///
/// Roots that do not exist on disk are still registered, with a warning;
/// scans of them fail until the directory shows up.
pub fn ensure_library_paths(conn: &Connection, configured: &[LibraryConfig]) -> Result<Vec<LibraryPath>> {
    let mut roots = Vec::new();
    for lib_cfg in configured {
        let library = libraries::get_or_create_library(conn, &lib_cfg.name)?;
        for path in &lib_cfg.paths {
            if !path.is_dir() {
                tracing::warn!(library = %lib_cfg.name, path = %path.display(), "library root is not a directory");
            }
            let root = library_paths::get_or_create_library_path(conn, library.id, path)?;
            if root.library_id != library.id {
                tracing::warn!(
                    library = %lib_cfg.name,
                    path = %path.display(),
                    "root already belongs to another library; keeping the existing owner"
                );
            }
            roots.push(root);
        }
    }
    Ok(roots)
}

/// Queue a scan of every root, skipping roots with a scan already pending.
pub fn enqueue_scans(conn: &Connection, roots: &[LibraryPath]) -> Result<Vec<Job>> {
    let mut created = Vec::new();
    for root in roots {
        if let Some(job) = jobs::enqueue_unique(conn, &JobPayload::scan_path(root.id))? {
            created.push(job);
        }
    }
    Ok(created)
}

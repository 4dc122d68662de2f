//! Directory walking.
//!
//! [`scan`] walks a tree following symlinks and reports every regular file
//! whose extension is in the allowed set. Failures on individual entries are
//! collected rather than aborting the walk, so one unreadable directory does
//! not hide the rest of the tree.

use std::path::{Path, PathBuf};

use ms_core::media;
use walkdir::WalkDir;

/// A regular file found by [`scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// File name without its extension.
    pub name: String,
    pub file_name: String,
    pub absolute_path: PathBuf,
    /// Lowercase, without the leading dot.
    pub extension: String,
    pub size_bytes: u64,
}

/// An entry the walk could not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub path: Option<PathBuf>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub files: Vec<ScannedFile>,
    pub errors: Vec<ScanError>,
}

/// Walk `root` and collect the files whose extension is in `extensions`.
///
/// `extensions` must already be normalized (lowercase, no dot).
pub fn scan(root: &Path, extensions: &[String]) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), "walk error: {e}");
                outcome.errors.push(ScanError {
                    path: e.path().map(Path::to_path_buf),
                    message: e.to_string(),
                });
                continue;
            }
        };

        // With follow_links the file type is already that of the target.
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(extension) = media::extension_of(path) else {
            continue;
        };
        if !extensions.contains(&extension) {
            continue;
        }

        let size_bytes = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to stat file: {e}");
                outcome.errors.push(ScanError {
                    path: Some(path.to_path_buf()),
                    message: e.to_string(),
                });
                continue;
            }
        };

        let file_name = entry.file_name().to_string_lossy().to_string();
        outcome.files.push(ScannedFile {
            name: media::title_from_file_name(&file_name),
            file_name,
            absolute_path: path.to_path_buf(),
            extension,
            size_bytes,
        });
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn exts() -> Vec<String> {
        vec!["mp4".to_string(), "mkv".to_string()]
    }

    #[test]
    fn finds_matching_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("shows/season 1")).unwrap();
        fs::write(dir.path().join("a.mp4"), b"12345").unwrap();
        fs::write(dir.path().join("shows/season 1/ep1.MKV"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("cover.jpg"), b"x").unwrap();

        let mut outcome = scan(dir.path(), &exts());
        outcome.files.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(outcome.files[0].file_name, "a.mp4");
        assert_eq!(outcome.files[0].name, "a");
        assert_eq!(outcome.files[0].size_bytes, 5);
        assert_eq!(outcome.files[1].file_name, "ep1.MKV");
        assert_eq!(outcome.files[1].extension, "mkv");
    }

    #[test]
    fn dot_named_file_is_matched_by_its_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".mp4"), b"x").unwrap();
        let outcome = scan(dir.path(), &exts());
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].file_name, ".mp4");
        assert_eq!(outcome.files[0].extension, "mp4");
    }

    #[test]
    fn directories_with_media_extension_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("folder.mp4")).unwrap();
        let outcome = scan(dir.path(), &exts());
        assert!(outcome.files.is_empty());
    }

    #[test]
    fn missing_root_is_reported_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = scan(&dir.path().join("gone"), &exts());
        assert!(outcome.files.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn follows_symlinked_directories() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("linked.mp4"), b"x").unwrap();

        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

        let outcome = scan(root.path(), &exts());
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(
            outcome.files[0].absolute_path,
            root.path().join("link/linked.mp4")
        );
    }
}

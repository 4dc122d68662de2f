//! Media-domain helpers: extension allow-lists, file classification and the
//! root-relative path convention used by the catalog.
//!
//! Relative paths are stored with a leading `/` and `/` separators, e.g. a
//! file `/media/movies/sub/a.mp4` under root `/media/movies` is recorded as
//! `/sub/a.mp4`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Video extensions scanned when no configuration overrides them.
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mkv", "avi", "wmv", "flv", "webm", "f4v", "mpg", "m2ts", "mov",
];

/// Image extensions recognised by the watcher.
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "png", "webp"];

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// Classification of a file by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
        }
    }
}

// ---------------------------------------------------------------------------
// ImageRelation
// ---------------------------------------------------------------------------

/// How an image relates to a media record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageRelation {
    Thumbnail,
}

impl ImageRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for ImageRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify `path` against the video and image allow-lists.
///
/// Both lists are expected to be normalized (see [`normalize_extension`]).
pub fn classify(path: &Path, video: &[String], image: &[String]) -> Option<MediaKind> {
    let ext = extension_of(path)?;
    if video.iter().any(|e| *e == ext) {
        Some(MediaKind::Video)
    } else if image.iter().any(|e| *e == ext) {
        Some(MediaKind::Image)
    } else {
        None
    }
}

/// Lowercase an extension and strip any leading dot.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// The lowercase text after the last `.` of the file name, if any.
///
/// Unlike [`Path::extension`], a leading dot counts: `.mp4` has the
/// extension `mp4` and is scanned like any other video.
pub fn extension_of(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// File name with its final extension removed; used as the display title.
pub fn title_from_file_name(file_name: &str) -> String {
    match Path::new(file_name).file_stem().and_then(|s| s.to_str()) {
        Some(stem) => stem.to_string(),
        None => file_name.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Root-relative paths
// ---------------------------------------------------------------------------

/// Express `path` relative to `root` in catalog form (`/a/b.mp4`).
///
/// Returns `None` when `path` is not beneath `root`. The root itself maps
/// to `/`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rest = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in rest.components() {
        match component {
            Component::Normal(part) => {
                out.push('/');
                out.push_str(&part.to_string_lossy());
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    Some(out)
}

/// Resolve a catalog relative path back onto its root.
pub fn absolute_path(root: &Path, relative: &str) -> PathBuf {
    let trimmed = relative.trim_start_matches('/');
    if trimmed.is_empty() {
        root.to_path_buf()
    } else {
        root.join(trimmed)
    }
}

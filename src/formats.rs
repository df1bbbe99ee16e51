/// Media type detection
///
/// Maps file extensions to MIME types and MIME types to the media kinds the
/// pipeline knows how to compress.

use std::fmt;
use std::path::Path;

/// Broad category of an uploaded file, derived from its MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a MIME type by its top-level type
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let mime = mime_type.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Some(MediaKind::Image)
        } else if mime.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        };
        write!(f, "{}", name)
    }
}

const EXTENSION_MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("3gp", "video/3gpp"),
];

/// Guess a MIME type from a path's extension, falling back to
/// `application/octet-stream` for anything unrecognised.
pub fn mime_from_path(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(mime_from_extension)
        .unwrap_or("application/octet-stream")
}

pub fn mime_from_extension(extension: &str) -> Option<&'static str> {
    let ext = extension.to_lowercase();
    EXTENSION_MIME_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

/// Check if a file path has an extension the pipeline recognises as media
pub fn is_media_file(path: &Path) -> bool {
    MediaKind::from_mime(mime_from_path(path)).is_some()
}

/// Replace the extension of a file name, keeping its stem
pub fn with_extension(file_name: &str, extension: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "upload".to_string());
    format!("{}.{}", stem, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("image/png"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("IMAGE/JPEG"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("video/mp4"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_mime("application/pdf"), None);
        assert_eq!(MediaKind::from_mime(""), None);
    }

    #[test]
    fn test_mime_from_path() {
        assert_eq!(mime_from_path(Path::new("clip.MP4")), "video/mp4");
        assert_eq!(mime_from_path(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(mime_from_path(Path::new("photo.jpg")), "image/jpeg");
        assert_eq!(mime_from_path(Path::new("notes.txt")), "application/octet-stream");
        assert_eq!(mime_from_path(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_is_media_file() {
        assert!(is_media_file(Path::new("a.png")));
        assert!(is_media_file(Path::new("b.webm")));
        assert!(!is_media_file(Path::new("c.doc")));
    }

    #[test]
    fn test_with_extension() {
        assert_eq!(with_extension("goal.mov", "mp4"), "goal.mp4");
        assert_eq!(with_extension("archive.tar.gz", "jpg"), "archive.tar.jpg");
        assert_eq!(with_extension("", "mp4"), "upload.mp4");
    }
}

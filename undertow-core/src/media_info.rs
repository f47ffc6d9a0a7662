//! Content types for streamed media files.

use crate::engine::FileEntry;

/// Content type used when the extension is not recognized.
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Content type produced by the transcode pipeline.
pub const TRANSCODED_CONTENT_TYPE: &str = "video/mp4";

/// Maps a lower-case file extension to its MIME type.
pub fn mime_type(extension: &str) -> &'static str {
    match extension {
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ts" => "video/mp2t",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Content type for a torrent file, from its extension.
pub fn content_type(file: &FileEntry) -> &'static str {
    file.extension()
        .map(|ext| mime_type(&ext))
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(mime_type("mkv"), "video/x-matroska");
        assert_eq!(mime_type("webm"), "video/webm");
        assert_eq!(mime_type("ts"), "video/mp2t");
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        let file = FileEntry {
            index: 0,
            name: "clip.flv".to_string(),
            length: 1,
        };
        assert_eq!(content_type(&file), DEFAULT_CONTENT_TYPE);

        let bare = FileEntry {
            index: 0,
            name: "README".to_string(),
            length: 1,
        };
        assert_eq!(content_type(&bare), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_extension_case_is_ignored() {
        let file = FileEntry {
            index: 0,
            name: "Movie.AVI".to_string(),
            length: 1,
        };
        assert_eq!(content_type(&file), "video/x-msvideo");
    }
}

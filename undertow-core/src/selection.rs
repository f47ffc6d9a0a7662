//! Picks the file to stream out of a torrent's file list.

use crate::engine::FileEntry;
use crate::error::{GatewayError, GatewayResult};

/// Container extensions treated as playable video.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "webm", "mov", "m4v", "ts"];

/// How the client asked for a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FileSelector {
    /// Largest recognized video file.
    #[default]
    Default,
    /// Explicit position in the file list.
    Index(usize),
    /// Explicit file name, matched against the full path or its last component.
    Name(String),
}

impl FileSelector {
    /// Builds a selector from optional request overrides; the index wins.
    pub fn from_parts(index: Option<usize>, name: Option<String>) -> Self {
        match (index, name) {
            (Some(index), _) => FileSelector::Index(index),
            (None, Some(name)) if !name.is_empty() => FileSelector::Name(name),
            _ => FileSelector::Default,
        }
    }
}

/// Checks whether a file name carries a recognized video extension.
pub fn is_video_file(file: &FileEntry) -> bool {
    file.extension()
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Selects the file to stream.
///
/// Explicit selectors are honored as given. Otherwise the largest video file
/// wins, which separates the main title from bundled trailers and samples.
///
/// # Errors
/// - `GatewayError::NoPlayableFile` - Nothing matches the selector
pub fn select_file<'a>(
    files: &'a [FileEntry],
    selector: &FileSelector,
) -> GatewayResult<&'a FileEntry> {
    let selected = match selector {
        FileSelector::Index(index) => files.iter().find(|file| file.index == *index),
        FileSelector::Name(name) => files
            .iter()
            .find(|file| file.name == *name || file.file_name() == name),
        FileSelector::Default => files
            .iter()
            .filter(|file| is_video_file(file))
            .max_by_key(|file| file.length),
    };

    selected.ok_or(GatewayError::NoPlayableFile)
}

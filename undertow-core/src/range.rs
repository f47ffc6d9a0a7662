//! HTTP Range request handling for video streaming
//!
//! Implements the single-range subset of RFC 7233 that media players use.
//! Malformed headers are ignored so the client gets the full file, while
//! well-formed ranges outside the file are rejected with 416.

use crate::error::{GatewayError, GatewayResult};

/// Parsed `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=start-end` or `bytes=start-`
    FromTo { start: u64, end: Option<u64> },
    /// `bytes=-length`: the final `length` bytes
    Suffix(u64),
}

/// Inclusive byte window inside a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
    pub file_size: u64,
}

impl ResolvedRange {
    /// Number of bytes in the window.
    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.file_size)
    }
}

/// Parses a `Range` header value.
///
/// Returns `None` for anything that is not a single `bytes=` range,
/// including a last byte before the first one; callers then serve the whole
/// file.
///
/// # Examples
/// ```
/// use undertow_core::range::{RangeSpec, parse_range_header};
/// assert_eq!(
///     parse_range_header("bytes=100-199"),
///     Some(RangeSpec::FromTo { start: 100, end: Some(199) })
/// );
/// assert_eq!(parse_range_header("items=0-1"), None);
/// assert_eq!(parse_range_header("bytes=50-10"), None);
/// ```
pub fn parse_range_header(range: &str) -> Option<RangeSpec> {
    let range_spec = range.trim().strip_prefix("bytes=")?.trim();
    if range_spec.contains(',') {
        return None;
    }

    let (start_str, end_str) = range_spec.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        let length = end_str.parse::<u64>().ok()?;
        return Some(RangeSpec::Suffix(length));
    }

    let start = start_str.parse::<u64>().ok()?;
    let end = if end_str.is_empty() {
        None
    } else {
        Some(end_str.parse::<u64>().ok()?)
    };
    if end.is_some_and(|end| end < start) {
        return None;
    }
    Some(RangeSpec::FromTo { start, end })
}

impl RangeSpec {
    /// Resolves the range against a file size.
    ///
    /// A missing end means the last byte; an end past the file is clamped.
    ///
    /// # Errors
    /// - `GatewayError::RangeNotSatisfiable` - Start at or past the end of the
    ///   file, or an empty suffix
    pub fn resolve(self, file_size: u64) -> GatewayResult<ResolvedRange> {
        let unsatisfiable = GatewayError::RangeNotSatisfiable { file_size };
        if file_size == 0 {
            return Err(unsatisfiable);
        }
        let last = file_size - 1;

        let (start, end) = match self {
            RangeSpec::FromTo { start, .. } if start > last => return Err(unsatisfiable),
            RangeSpec::FromTo { start, end } => (start, end.unwrap_or(last).min(last)),
            RangeSpec::Suffix(0) => return Err(unsatisfiable),
            RangeSpec::Suffix(length) => (file_size.saturating_sub(length), last),
        };

        Ok(ResolvedRange {
            start,
            end,
            file_size,
        })
    }
}

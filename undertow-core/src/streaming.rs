//! Byte-range streaming of torrent files that may still be downloading.
//!
//! Reads are issued in file-offset order, one chunk at a time, only when the
//! HTTP body asks for more data. A chunk that has not been downloaded yet is
//! retried after a short delay, so a slow swarm stalls one response without
//! blocking anything else. Sessions are never locked while streaming.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use tracing::{debug, warn};

use crate::config::StreamingConfig;
use crate::engine::{FileEntry, ReadError, TorrentHandle};
use crate::error::GatewayResult;
use crate::media_info::content_type;
use crate::range::parse_range_header;
use crate::selection::{FileSelector, select_file};
use crate::session::Session;

/// Sequential reader over a window of one torrent file.
pub struct FileReader {
    handle: Arc<dyn TorrentHandle>,
    file_index: usize,
    position: u64,
    remaining: u64,
    chunk_size: usize,
    retry_delay: Duration,
}

impl FileReader {
    /// Creates a reader for `length` bytes of `file` starting at `start`.
    pub fn new(
        handle: Arc<dyn TorrentHandle>,
        file: &FileEntry,
        start: u64,
        length: u64,
        config: &StreamingConfig,
    ) -> Self {
        Self {
            handle,
            file_index: file.index,
            position: start,
            remaining: length,
            chunk_size: config.chunk_size.max(1),
            retry_delay: config.read_retry_delay,
        }
    }

    /// Current file offset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads the next chunk, waiting for bytes that are not downloaded yet.
    ///
    /// Returns `Ok(None)` once the window is exhausted.
    ///
    /// # Errors
    /// - `ReadError::OutOfBounds` - Engine reports the window outside the file
    /// - `ReadError::Storage` - Engine storage failure
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, ReadError> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let length = self.remaining.min(self.chunk_size as u64) as usize;
        loop {
            match self
                .handle
                .read_at(self.file_index, self.position, length)
                .await
            {
                Ok(bytes) if bytes.is_empty() => {
                    tokio::time::sleep(self.retry_delay).await;
                }
                Ok(mut bytes) => {
                    if bytes.len() as u64 > self.remaining {
                        bytes.truncate(self.remaining as usize);
                    }
                    self.position += bytes.len() as u64;
                    self.remaining -= bytes.len() as u64;
                    return Ok(Some(bytes));
                }
                Err(ReadError::NotYetAvailable) => {
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Turns the reader into a body stream.
    ///
    /// A read failure yields one I/O error and ends the stream, which aborts
    /// the response without affecting other connections.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
        stream::unfold(Some(self), |reader| async move {
            let mut reader = reader?;
            match reader.next_chunk().await {
                Ok(Some(bytes)) => Some((Ok(bytes), Some(reader))),
                Ok(None) => None,
                Err(e) => {
                    warn!(
                        "Read failed at offset {} of file {}: {}",
                        reader.position, reader.file_index, e
                    );
                    Some((Err(std::io::Error::other(e)), None))
                }
            }
        })
    }
}

/// Serves HTTP GET requests against a session's files.
#[derive(Debug, Clone)]
pub struct RangeStreamer {
    config: StreamingConfig,
}

impl RangeStreamer {
    pub fn new(config: &StreamingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Builds the response for one stream request.
    ///
    /// The first chunk is read before the response is returned, so a failing
    /// upstream still gets a proper error status. Malformed `Range` headers
    /// fall back to the full file.
    ///
    /// # Errors
    /// - `GatewayError::NoPlayableFile` - Nothing matches the selector
    /// - `GatewayError::RangeNotSatisfiable` - Range outside the file
    /// - `GatewayError::UpstreamRead` - First read failed
    pub async fn serve(
        &self,
        session: &Session,
        selector: &FileSelector,
        range_header: Option<&str>,
    ) -> GatewayResult<Response> {
        let files = session.files();
        let file = select_file(&files, selector)?.clone();
        session.set_selected_file(file.clone());

        let range = match range_header {
            None => None,
            Some(raw) => match parse_range_header(raw) {
                Some(spec) => Some(spec.resolve(file.length)?),
                None => {
                    debug!("Ignoring malformed Range header {:?}", raw);
                    None
                }
            },
        };

        let (start, length) = match range {
            Some(range) => (range.start, range.content_length()),
            None => (0, file.length),
        };
        debug!(
            "Streaming {} bytes of {} from offset {} ({:?})",
            length, file.name, start, range
        );

        let mut reader = FileReader::new(
            session.handle().clone(),
            &file,
            start,
            length,
            &self.config,
        );
        let first_chunk = reader.next_chunk().await?;
        let body = Body::from_stream(
            stream::iter(first_chunk.map(Ok)).chain(reader.into_stream()),
        );

        let mut response = Response::builder()
            .header(header::CONTENT_TYPE, content_type(&file))
            .header(header::CONTENT_LENGTH, length.to_string())
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CACHE_CONTROL, "no-cache");

        response = match range {
            Some(range) => response
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_RANGE, range.content_range()),
            None => response.status(StatusCode::OK),
        };

        Ok(response
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use bytes::Bytes;

    use super::*;
    use crate::error::GatewayError;
    use crate::session::test_support::{MockHandle, info_hash};

    fn movie_bytes(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>())
    }

    fn streamer() -> RangeStreamer {
        RangeStreamer::new(&StreamingConfig {
            chunk_size: 1000,
            read_retry_delay: Duration::from_millis(1),
        })
    }

    fn session_with(files: Vec<(&str, Bytes)>) -> (Arc<MockHandle>, Session) {
        let handle = MockHandle::ready(info_hash(1), files);
        let session = Session::new(handle.clone());
        (handle, session)
    }

    #[tokio::test]
    async fn test_full_file_without_range() {
        let data = movie_bytes(10_000);
        let (_, session) = session_with(vec![("movie.mkv", data.clone())]);

        let response = streamer()
            .serve(&session, &FileSelector::Default, None)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_LENGTH], "10000");
        assert_eq!(headers[header::CONTENT_TYPE], "video/x-matroska");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
        assert!(headers.get(header::CONTENT_RANGE).is_none());

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, data);
        assert_eq!(session.selected_file().unwrap().name, "movie.mkv");
    }

    #[tokio::test]
    async fn test_partial_content() {
        let data = movie_bytes(10_000);
        let (_, session) = session_with(vec![("movie.mp4", data.clone())]);

        let response = streamer()
            .serve(&session, &FileSelector::Default, Some("bytes=2500-7499"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            "bytes 2500-7499/10000"
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5000");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, data.slice(2500..7500));
    }

    #[tokio::test]
    async fn test_malformed_range_serves_full_file() {
        let data = movie_bytes(3000);
        let (_, session) = session_with(vec![("movie.mp4", data.clone())]);

        let response = streamer()
            .serve(&session, &FileSelector::Default, Some("bytes=oops"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), 3000);
    }

    #[tokio::test]
    async fn test_range_past_end_is_unsatisfiable() {
        let (_, session) = session_with(vec![("movie.mp4", movie_bytes(100))]);

        let result = streamer()
            .serve(&session, &FileSelector::Default, Some("bytes=100-"))
            .await;

        assert!(matches!(
            result,
            Err(GatewayError::RangeNotSatisfiable { file_size: 100 })
        ));
    }

    #[tokio::test]
    async fn test_waits_for_missing_bytes() {
        let data = movie_bytes(4000);
        let (handle, session) = session_with(vec![("movie.mp4", data.clone())]);
        *handle.unavailable_reads.lock() = 3;

        let response = streamer()
            .serve(&session, &FileSelector::Default, None)
            .await
            .unwrap();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, data);
    }

    #[tokio::test]
    async fn test_first_read_failure_is_an_error() {
        let (handle, session) = session_with(vec![("movie.mp4", movie_bytes(4000))]);
        handle.broken_files.lock().insert(0);

        let result = streamer()
            .serve(&session, &FileSelector::Default, None)
            .await;

        assert!(matches!(result, Err(GatewayError::UpstreamRead(_))));
    }

    #[tokio::test]
    async fn test_failure_after_headers_aborts_body() {
        let (handle, session) = session_with(vec![("movie.mp4", movie_bytes(4000))]);

        let response = streamer()
            .serve(&session, &FileSelector::Default, None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        handle.broken_files.lock().insert(0);
        assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_metadata_is_no_playable_file() {
        let handle = MockHandle::pending(info_hash(2));
        let session = Session::new(handle);

        let result = streamer()
            .serve(&session, &FileSelector::Default, None)
            .await;

        assert!(matches!(result, Err(GatewayError::NoPlayableFile)));
    }

    #[tokio::test]
    async fn test_explicit_index_selects_file() {
        let (_, session) = session_with(vec![
            ("movie.mkv", movie_bytes(5000)),
            ("extras/interview.mp4", movie_bytes(700)),
        ]);

        let response = streamer()
            .serve(&session, &FileSelector::Index(1), None)
            .await
            .unwrap();

        assert_eq!(response.headers()[header::CONTENT_LENGTH], "700");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    }

    #[tokio::test]
    async fn test_concurrent_ranges_on_one_session() {
        let data = movie_bytes(20_000);
        let (_, session) = session_with(vec![("movie.mp4", data.clone())]);
        let streamer = streamer();

        let (early, late) = tokio::join!(
            streamer.serve(&session, &FileSelector::Default, Some("bytes=0-9999")),
            streamer.serve(&session, &FileSelector::Default, Some("bytes=15000-")),
        );

        let (early, late) = tokio::join!(
            to_bytes(early.unwrap().into_body(), usize::MAX),
            to_bytes(late.unwrap().into_body(), usize::MAX),
        );
        assert_eq!(early.unwrap(), data.slice(0..10_000));
        assert_eq!(late.unwrap(), data.slice(15_000..));
    }
}

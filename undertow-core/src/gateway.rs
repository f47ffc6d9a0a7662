//! Request-level orchestration over the gateway components.
//!
//! `Gateway` is what the HTTP layer talks to: it resolves sessions, gates
//! streams on readiness, and hands the session to the range streamer or the
//! transcode pipeline.

use std::sync::Arc;

use axum::response::Response;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::engine::{DownloadEngine, InfoHash};
use crate::error::{GatewayError, GatewayResult};
use crate::readiness::{Readiness, ReadinessWaiter};
use crate::registry::{Lookup, SessionRegistry};
use crate::selection::FileSelector;
use crate::status::{self, SessionStatus};
use crate::streaming::RangeStreamer;
use crate::transcode::TranscodePipeline;

/// Streaming gateway bound to one download engine.
pub struct Gateway {
    config: GatewayConfig,
    registry: SessionRegistry,
    waiter: ReadinessWaiter,
    streamer: RangeStreamer,
    transcoder: TranscodePipeline,
}

impl Gateway {
    pub fn new(engine: Arc<dyn DownloadEngine>, config: GatewayConfig) -> Self {
        Self {
            registry: SessionRegistry::new(engine),
            waiter: ReadinessWaiter::new(&config.readiness),
            streamer: RangeStreamer::new(&config.streaming),
            transcoder: TranscodePipeline::new(&config.transcode, &config.streaming),
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn transcoder(&self) -> &TranscodePipeline {
        &self.transcoder
    }

    /// Number of sessions with a live engine handle.
    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Status of `info_hash`; never creates a session.
    pub fn status(&self, info_hash: InfoHash) -> SessionStatus {
        status::status(&self.registry, info_hash)
    }

    /// Serves a stream request, creating the session on first use.
    ///
    /// Waits for metadata up to the readiness ceiling. After a timeout the
    /// request proceeds with whatever files are known, which usually means
    /// `NoPlayableFile`; the client is expected to retry. Headers are only sent
    /// once the first bytes are downloaded, bounded by the playback-start
    /// ceiling.
    ///
    /// # Errors
    /// - `GatewayError::SessionCreationFailed` - Engine rejected the identifier
    /// - `GatewayError::SessionFailed` - Engine gave up on the download
    /// - `GatewayError::PlaybackStartTimeout` - No bytes before the ceiling
    /// - Any error from [`RangeStreamer::serve`]
    pub async fn stream(
        &self,
        info_hash: InfoHash,
        selector: &FileSelector,
        range_header: Option<&str>,
    ) -> GatewayResult<Response> {
        let session = self.registry.resolve(info_hash).await?;

        match self.waiter.await_ready(&session).await {
            Readiness::Ready => {}
            Readiness::TimedOut => {
                info!("Streaming {} before metadata arrived", info_hash);
            }
            Readiness::Failed(reason) => {
                return Err(GatewayError::SessionFailed { info_hash, reason });
            }
        }

        let deadline = self.config.readiness.playback_start_ceiling;
        let serve = self.streamer.serve(&session, selector, range_header);
        match tokio::time::timeout(deadline, serve).await {
            Ok(result) => result,
            Err(_) => {
                warn!("No bytes of {} available after {:?}", info_hash, deadline);
                Err(GatewayError::PlaybackStartTimeout { waited: deadline })
            }
        }
    }

    /// Serves a transcode request for an already streamable session.
    ///
    /// # Errors
    /// - `GatewayError::NotReady` - No session yet, or metadata still loading
    /// - Any error from [`TranscodePipeline::transcode`]
    pub async fn transcode(
        &self,
        info_hash: InfoHash,
        selector: &FileSelector,
    ) -> GatewayResult<Response> {
        match self.registry.get(info_hash) {
            Lookup::Active(session) => self.transcoder.transcode(&session, selector).await,
            Lookup::Pending | Lookup::Missing => {
                debug!("Transcode requested for {} without a session", info_hash);
                Err(GatewayError::NotReady)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use bytes::Bytes;

    use super::*;
    use crate::engine::{EngineError, TorrentHandle, TorrentStatus};
    use crate::session::test_support::{MockHandle, info_hash};

    struct OneTorrent {
        handle: Arc<MockHandle>,
        adds: AtomicUsize,
    }

    impl OneTorrent {
        fn new(handle: Arc<MockHandle>) -> Arc<Self> {
            Arc::new(Self {
                handle,
                adds: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DownloadEngine for OneTorrent {
        async fn add(&self, _info_hash: InfoHash) -> Result<Arc<dyn TorrentHandle>, EngineError> {
            self.adds.fetch_add(1, Ordering::SeqCst);
            Ok(self.handle.clone())
        }
    }

    #[tokio::test]
    async fn test_stream_creates_session_once() {
        let handle = MockHandle::ready(
            info_hash(1),
            vec![("movie.mp4", Bytes::from(vec![7u8; 5000]))],
        );
        handle.stats.lock().peers = 3;
        let engine = OneTorrent::new(handle);
        let gateway = Gateway::new(engine.clone(), GatewayConfig::for_testing());

        for _ in 0..2 {
            let response = gateway
                .stream(info_hash(1), &FileSelector::Default, None)
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(body.len(), 5000);
        }

        assert_eq!(engine.adds.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.active_sessions(), 1);
    }

    #[tokio::test]
    async fn test_stream_waits_for_metadata() {
        let handle = MockHandle::pending(info_hash(2));
        let gateway = Gateway::new(OneTorrent::new(handle.clone()), GatewayConfig::for_testing());

        let publisher = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            handle.publish(vec![("late.mkv", Bytes::from(vec![1u8; 100]))]);
        });

        let response = gateway
            .stream(info_hash(2), &FileSelector::Default, Some("bytes=0-9"))
            .await
            .unwrap();
        publisher.await.unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    }

    #[tokio::test]
    async fn test_metadata_never_arrives() {
        let handle = MockHandle::pending(info_hash(3));
        let gateway = Gateway::new(OneTorrent::new(handle), GatewayConfig::for_testing());

        let result = gateway
            .stream(info_hash(3), &FileSelector::Default, None)
            .await;
        assert!(matches!(result, Err(GatewayError::NoPlayableFile)));
    }

    #[tokio::test]
    async fn test_failed_download_is_reported() {
        let handle = MockHandle::pending(info_hash(4));
        handle
            .status
            .send_replace(TorrentStatus::Failed("no trackers".to_string()));
        let gateway = Gateway::new(OneTorrent::new(handle), GatewayConfig::for_testing());

        let result = gateway
            .stream(info_hash(4), &FileSelector::Default, None)
            .await;
        assert!(matches!(
            result,
            Err(GatewayError::SessionFailed { reason, .. }) if reason == "no trackers"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_without_bytes_times_out() {
        let handle = MockHandle::ready(
            info_hash(7),
            vec![("stuck.mp4", Bytes::from(vec![0u8; 1000]))],
        );
        handle.stats.lock().peers = 1;
        *handle.unavailable_reads.lock() = usize::MAX;
        let config = GatewayConfig::for_testing();
        let ceiling = config.readiness.playback_start_ceiling;
        let gateway = Gateway::new(OneTorrent::new(handle), config);

        let started = tokio::time::Instant::now();
        let result = gateway
            .stream(info_hash(7), &FileSelector::Default, None)
            .await;

        assert!(matches!(
            result,
            Err(GatewayError::PlaybackStartTimeout { waited }) if waited == ceiling
        ));
        assert!(started.elapsed() >= ceiling);
    }

    #[tokio::test]
    async fn test_transcode_needs_existing_session() {
        let handle = MockHandle::ready(info_hash(5), vec![("a.mp4", Bytes::from_static(b"x"))]);
        let engine = OneTorrent::new(handle);
        let gateway = Gateway::new(engine.clone(), GatewayConfig::for_testing());

        let result = gateway.transcode(info_hash(5), &FileSelector::Default).await;
        assert!(matches!(result, Err(GatewayError::NotReady)));
        assert_eq!(engine.adds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_status_does_not_create_sessions() {
        let handle = MockHandle::pending(info_hash(6));
        let engine = OneTorrent::new(handle);
        let gateway = Gateway::new(engine.clone(), GatewayConfig::for_testing());

        assert_eq!(gateway.status(info_hash(6)), SessionStatus::NotFound);
        assert_eq!(engine.adds.load(Ordering::SeqCst), 0);
    }
}

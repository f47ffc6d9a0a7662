//! Gates streaming on torrent metadata with a bounded wait.
//!
//! The engine reports metadata asynchronously. A stream request waits for it
//! at most [`ReadinessConfig::ceiling`], then proceeds with whatever file list
//! is known so a client is never left hanging.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ReadinessConfig;
use crate::engine::TorrentStatus;
use crate::session::{Session, SessionState};

/// Outcome of waiting for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Metadata is known.
    Ready,
    /// Ceiling reached without metadata; proceed with what is known.
    TimedOut,
    /// The engine gave up on the download.
    Failed(String),
}

/// Waits for sessions to become streamable.
#[derive(Debug, Clone)]
pub struct ReadinessWaiter {
    peer_grace: Duration,
    ceiling: Duration,
}

impl ReadinessWaiter {
    pub fn new(config: &ReadinessConfig) -> Self {
        Self {
            peer_grace: config.peer_grace,
            ceiling: config.ceiling,
        }
    }

    /// Waits until `session` has metadata, fails, or the ceiling elapses.
    ///
    /// After metadata arrives with no connected peers, waits the peer grace
    /// delay once so a connection can be attempted. Zero peers afterwards is
    /// still `Ready`; discovery continues during playback.
    pub async fn await_ready(&self, session: &Session) -> Readiness {
        if session.state() == SessionState::Ready {
            return Readiness::Ready;
        }

        let mut status = session.subscribe();
        let settled = tokio::time::timeout(
            self.ceiling,
            status.wait_for(|status| !matches!(status, TorrentStatus::FetchingMetadata)),
        )
        .await
        .map(|waited| waited.map(|status| status.clone()));

        let outcome = match settled {
            Ok(Ok(status)) => status,
            // Sender dropped: the engine is gone, use the last known value.
            Ok(Err(_)) => status.borrow().clone(),
            Err(_) => {
                warn!(
                    "Metadata for {} not ready after {:?}, proceeding with {} known files",
                    session.info_hash(),
                    self.ceiling,
                    session.files().len()
                );
                return Readiness::TimedOut;
            }
        };

        match outcome {
            TorrentStatus::Ready => {
                if session.stats().peers == 0 {
                    debug!(
                        "No peers yet for {}, waiting {:?}",
                        session.info_hash(),
                        self.peer_grace
                    );
                    tokio::time::sleep(self.peer_grace).await;
                }
                info!(
                    "Session {} ready with {} peers",
                    session.info_hash(),
                    session.stats().peers
                );
                Readiness::Ready
            }
            TorrentStatus::Failed(reason) => Readiness::Failed(reason),
            TorrentStatus::FetchingMetadata => Readiness::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use bytes::Bytes;

    use super::*;
    use crate::session::test_support::{MockHandle, info_hash};

    fn waiter(grace_ms: u64, ceiling_ms: u64) -> ReadinessWaiter {
        ReadinessWaiter {
            peer_grace: Duration::from_millis(grace_ms),
            ceiling: Duration::from_millis(ceiling_ms),
        }
    }

    #[tokio::test]
    async fn test_ready_session_returns_immediately() {
        let handle = MockHandle::ready(info_hash(1), vec![("a.mp4", Bytes::from_static(b"x"))]);
        let session = Session::new(handle);

        let started = Instant::now();
        let outcome = waiter(1000, 5000).await_ready(&session).await;

        assert_eq!(outcome, Readiness::Ready);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_arrival_applies_peer_grace() {
        let handle = MockHandle::pending(info_hash(2));
        let session = Session::new(handle.clone());

        let publisher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.publish(vec![("a.mkv", Bytes::from_static(b"x"))]);
        });

        let started = tokio::time::Instant::now();
        let outcome = waiter(500, 15_000).await_ready(&session).await;
        publisher.await.unwrap();

        assert_eq!(outcome, Readiness::Ready);
        assert!(started.elapsed() >= Duration::from_millis(600));
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_peers_skip_grace() {
        let handle = MockHandle::pending(info_hash(3));
        handle.stats.lock().peers = 4;
        let session = Session::new(handle.clone());

        let publisher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.publish(vec![("a.mkv", Bytes::from_static(b"x"))]);
        });

        let started = tokio::time::Instant::now();
        let outcome = waiter(500, 15_000).await_ready(&session).await;
        publisher.await.unwrap();

        assert_eq!(outcome, Readiness::Ready);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_forces_proceed() {
        let handle = MockHandle::pending(info_hash(4));
        let session = Session::new(handle);

        let started = tokio::time::Instant::now();
        let outcome = waiter(500, 15_000).await_ready(&session).await;

        assert_eq!(outcome, Readiness::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_engine_failure_is_reported() {
        let handle = MockHandle::pending(info_hash(5));
        let session = Session::new(handle.clone());
        handle
            .status
            .send_replace(TorrentStatus::Failed("no trackers".to_string()));

        let outcome = waiter(10, 1000).await_ready(&session).await;
        assert_eq!(outcome, Readiness::Failed("no trackers".to_string()));
    }
}

//! Read-only status projection of registry sessions.

use crate::engine::InfoHash;
use crate::registry::{Lookup, SessionRegistry};
use crate::selection::{FileSelector, select_file};
use crate::session::{Session, SessionState};

/// Snapshot of one session for status polling.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub state: SessionState,
    /// Download completion in `0.0..=1.0`
    pub progress: f64,
    pub peers: usize,
    /// Bytes per second
    pub download_rate: u64,
    pub downloaded_bytes: u64,
    pub selected_file_name: Option<String>,
}

impl StatusReport {
    /// Report for a session whose creation has not completed.
    pub fn requested() -> Self {
        Self {
            state: SessionState::Requested,
            progress: 0.0,
            peers: 0,
            download_rate: 0,
            downloaded_bytes: 0,
            selected_file_name: None,
        }
    }

    /// Builds a report from a live session.
    pub fn from_session(session: &Session) -> Self {
        let stats = session.stats();
        Self {
            state: session.state(),
            progress: stats.progress,
            peers: stats.peers,
            download_rate: stats.download_rate,
            downloaded_bytes: stats.downloaded,
            selected_file_name: display_name(session),
        }
    }

    /// Whether the session can be streamed.
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Completion as a whole percentage.
    pub fn progress_percent(&self) -> u8 {
        (self.progress * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Status lookup result; an unknown id is a value, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    NotFound,
    Found(StatusReport),
}

/// Reports the status of `info_hash` without creating a session.
pub fn status(registry: &SessionRegistry, info_hash: InfoHash) -> SessionStatus {
    match registry.get(info_hash) {
        Lookup::Missing => SessionStatus::NotFound,
        Lookup::Pending => SessionStatus::Found(StatusReport::requested()),
        Lookup::Active(session) => SessionStatus::Found(StatusReport::from_session(&session)),
    }
}

// The streamed file if one was picked, else the default pick, else the torrent name
fn display_name(session: &Session) -> Option<String> {
    if let Some(file) = session.selected_file() {
        return Some(file.file_name().to_string());
    }

    let files = session.files();
    select_file(&files, &FileSelector::Default)
        .ok()
        .map(|file| file.file_name().to_string())
        .or_else(|| session.name())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::engine::{DownloadEngine, EngineError, SwarmStats, TorrentHandle};
    use crate::session::test_support::{MockHandle, info_hash};

    struct FixedEngine(Arc<MockHandle>);

    #[async_trait]
    impl DownloadEngine for FixedEngine {
        async fn add(&self, _info_hash: InfoHash) -> Result<Arc<dyn TorrentHandle>, EngineError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let registry = SessionRegistry::new(Arc::new(FixedEngine(MockHandle::pending(
            info_hash(1),
        ))));

        assert_eq!(status(&registry, info_hash(9)), SessionStatus::NotFound);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_loading_session() {
        let handle = MockHandle::pending(info_hash(1));
        let registry = SessionRegistry::new(Arc::new(FixedEngine(handle)));
        registry.resolve(info_hash(1)).await.unwrap();

        let SessionStatus::Found(report) = status(&registry, info_hash(1)) else {
            panic!("session should be found");
        };
        assert_eq!(report.state, SessionState::MetadataLoading);
        assert!(!report.is_ready());
        assert_eq!(report.selected_file_name.as_deref(), Some("mock"));
    }

    #[tokio::test]
    async fn test_ready_session_reports_counters() {
        let handle = MockHandle::ready(
            info_hash(2),
            vec![
                ("Film/trailer.mp4", Bytes::from_static(b"tiny")),
                ("Film/film.mkv", Bytes::from(vec![0u8; 1024])),
            ],
        );
        *handle.stats.lock() = SwarmStats {
            peers: 7,
            download_rate: 125_000,
            downloaded: 512,
            progress: 0.426,
        };
        let registry = SessionRegistry::new(Arc::new(FixedEngine(handle)));
        registry.resolve(info_hash(2)).await.unwrap();

        let SessionStatus::Found(report) = status(&registry, info_hash(2)) else {
            panic!("session should be found");
        };
        assert!(report.is_ready());
        assert_eq!(report.peers, 7);
        assert_eq!(report.download_rate, 125_000);
        assert_eq!(report.downloaded_bytes, 512);
        assert_eq!(report.progress_percent(), 43);
        assert_eq!(report.selected_file_name.as_deref(), Some("film.mkv"));
    }

    #[tokio::test]
    async fn test_selected_file_takes_precedence() {
        let handle = MockHandle::ready(
            info_hash(3),
            vec![
                ("a.mp4", Bytes::from(vec![0u8; 10])),
                ("b.mp4", Bytes::from(vec![0u8; 100])),
            ],
        );
        let session = Session::new(handle);
        let files = session.files();
        session.set_selected_file(files[0].clone());

        let report = StatusReport::from_session(&session);
        assert_eq!(report.selected_file_name.as_deref(), Some("a.mp4"));
    }

    struct RejectingEngine;

    #[async_trait]
    impl DownloadEngine for RejectingEngine {
        async fn add(&self, info_hash: InfoHash) -> Result<Arc<dyn TorrentHandle>, EngineError> {
            Err(EngineError::Rejected {
                info_hash,
                reason: "unknown torrent".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_rejected_id_is_not_found() {
        let registry = SessionRegistry::new(Arc::new(RejectingEngine));

        assert!(registry.resolve(info_hash(4)).await.is_err());

        assert_eq!(status(&registry, info_hash(4)), SessionStatus::NotFound);
    }

    #[test]
    fn test_requested_report_is_zeroed() {
        let report = StatusReport::requested();
        assert_eq!(report.state, SessionState::Requested);
        assert_eq!(report.progress_percent(), 0);
        assert_eq!(report.peers, 0);
        assert!(report.selected_file_name.is_none());
    }
}

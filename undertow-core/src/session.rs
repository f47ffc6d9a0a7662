//! Download sessions tracked by the gateway.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;

use crate::engine::{FileEntry, InfoHash, SwarmStats, TorrentHandle, TorrentStatus};

/// Lifecycle of a session as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Creation is in flight; the engine has not accepted the identifier yet.
    Requested,
    /// The engine is fetching the file list.
    MetadataLoading,
    /// Files are known and can be streamed.
    Ready,
    /// The engine gave up on the download.
    Error,
}

impl From<&TorrentStatus> for SessionState {
    fn from(status: &TorrentStatus) -> Self {
        match status {
            TorrentStatus::FetchingMetadata => SessionState::MetadataLoading,
            TorrentStatus::Ready => SessionState::Ready,
            TorrentStatus::Failed(_) => SessionState::Error,
        }
    }
}

/// One active peer-to-peer download.
///
/// Sessions live for the whole process. Streaming never locks a session;
/// only the selected-file bookkeeping sits behind a lock.
pub struct Session {
    info_hash: InfoHash,
    handle: Arc<dyn TorrentHandle>,
    selected_file: RwLock<Option<FileEntry>>,
    downloaded_high_water: AtomicU64,
}

impl Session {
    /// Wraps an engine handle.
    pub fn new(handle: Arc<dyn TorrentHandle>) -> Self {
        Self {
            info_hash: handle.info_hash(),
            handle,
            selected_file: RwLock::new(None),
            downloaded_high_water: AtomicU64::new(0),
        }
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn handle(&self) -> &Arc<dyn TorrentHandle> {
        &self.handle
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from(&*self.handle.status().borrow())
    }

    /// Failure reason reported by the engine, if any.
    pub fn failure(&self) -> Option<String> {
        match &*self.handle.status().borrow() {
            TorrentStatus::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Subscribes to engine lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<TorrentStatus> {
        self.handle.status()
    }

    /// File list, empty until metadata arrives.
    pub fn files(&self) -> Vec<FileEntry> {
        self.handle.files().unwrap_or_default()
    }

    /// Torrent display name, once metadata is known.
    pub fn name(&self) -> Option<String> {
        self.handle.name()
    }

    /// File most recently chosen for streaming.
    pub fn selected_file(&self) -> Option<FileEntry> {
        self.selected_file.read().clone()
    }

    pub(crate) fn set_selected_file(&self, file: FileEntry) {
        *self.selected_file.write() = Some(file);
    }

    /// Swarm counters with `downloaded` held monotonic and `progress` clamped.
    pub fn stats(&self) -> SwarmStats {
        let mut stats = self.handle.stats();
        let previous = self
            .downloaded_high_water
            .fetch_max(stats.downloaded, Ordering::Relaxed);
        stats.downloaded = stats.downloaded.max(previous);
        stats.progress = if stats.progress.is_finite() {
            stats.progress.clamp(0.0, 1.0)
        } else {
            0.0
        };
        stats
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("info_hash", &self.info_hash)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scriptable in-memory torrent handle shared by the module tests.

    use std::collections::HashSet;

    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;

    use super::*;
    use crate::engine::ReadError;

    pub struct MockHandle {
        pub info_hash: InfoHash,
        pub files: Mutex<Option<Vec<(String, Bytes)>>>,
        pub stats: Mutex<SwarmStats>,
        pub status: watch::Sender<TorrentStatus>,
        pub unavailable_reads: Mutex<usize>,
        pub broken_files: Mutex<HashSet<usize>>,
    }

    impl MockHandle {
        pub fn pending(info_hash: InfoHash) -> Arc<Self> {
            let (status, _) = watch::channel(TorrentStatus::FetchingMetadata);
            Arc::new(Self {
                info_hash,
                files: Mutex::new(None),
                stats: Mutex::new(SwarmStats::default()),
                status,
                unavailable_reads: Mutex::new(0),
                broken_files: Mutex::new(HashSet::new()),
            })
        }

        pub fn ready(info_hash: InfoHash, files: Vec<(&str, Bytes)>) -> Arc<Self> {
            let handle = Self::pending(info_hash);
            handle.publish(files);
            handle
        }

        pub fn publish(&self, files: Vec<(&str, Bytes)>) {
            *self.files.lock() = Some(
                files
                    .into_iter()
                    .map(|(name, data)| (name.to_string(), data))
                    .collect(),
            );
            self.status.send_replace(TorrentStatus::Ready);
        }
    }

    #[async_trait]
    impl TorrentHandle for MockHandle {
        fn info_hash(&self) -> InfoHash {
            self.info_hash
        }

        fn name(&self) -> Option<String> {
            Some("mock".to_string())
        }

        fn files(&self) -> Option<Vec<FileEntry>> {
            self.files.lock().as_ref().map(|files| {
                files
                    .iter()
                    .enumerate()
                    .map(|(index, (name, data))| FileEntry {
                        index,
                        name: name.clone(),
                        length: data.len() as u64,
                    })
                    .collect()
            })
        }

        fn stats(&self) -> SwarmStats {
            *self.stats.lock()
        }

        fn status(&self) -> watch::Receiver<TorrentStatus> {
            self.status.subscribe()
        }

        async fn read_at(
            &self,
            file_index: usize,
            offset: u64,
            length: usize,
        ) -> Result<Bytes, ReadError> {
            {
                let mut unavailable = self.unavailable_reads.lock();
                if *unavailable > 0 {
                    *unavailable -= 1;
                    return Err(ReadError::NotYetAvailable);
                }
            }
            if self.broken_files.lock().contains(&file_index) {
                return Err(ReadError::Storage("disk on fire".to_string()));
            }

            let files = self.files.lock();
            let data = files
                .as_ref()
                .and_then(|files| files.get(file_index))
                .map(|(_, data)| data.clone())
                .ok_or(ReadError::NotYetAvailable)?;
            let file_size = data.len() as u64;
            if offset >= file_size {
                return Err(ReadError::OutOfBounds {
                    file_index,
                    offset,
                    length,
                    file_size,
                });
            }
            let end = (offset + length as u64).min(file_size);
            Ok(data.slice(offset as usize..end as usize))
        }
    }

    pub fn info_hash(byte: u8) -> InfoHash {
        InfoHash::new([byte; 20])
    }
}

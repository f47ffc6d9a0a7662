//! A simulated torrent download.
//!
//! Each torrent runs one tick task. After the metadata delay it publishes the
//! file list, then grows a sequentially downloaded prefix at the configured
//! speed while peers trickle in. Reads are served only from that prefix.

use std::io::SeekFrom;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use undertow_core::{FileEntry, InfoHash, ReadError, SwarmStats, TorrentHandle, TorrentStatus};

use crate::catalog::{CatalogEntry, FileSource};
use crate::engine::SimulationConfig;

#[derive(Debug, Default)]
struct Progress {
    peers: usize,
    download_rate: u64,
    downloaded: u64,
}

/// Download state of one simulated torrent.
pub struct SimulatedTorrent {
    info_hash: InfoHash,
    entry: Option<Arc<CatalogEntry>>,
    progress: Mutex<Progress>,
    status: watch::Sender<TorrentStatus>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedTorrent {
    /// Starts simulating the download of a catalog entry.
    pub fn start(entry: Arc<CatalogEntry>, config: &SimulationConfig) -> Arc<Self> {
        let (status, _) = watch::channel(TorrentStatus::FetchingMetadata);
        let torrent = Arc::new(Self {
            info_hash: entry.info_hash,
            entry: Some(entry),
            progress: Mutex::new(Progress::default()),
            status,
            ticker: Mutex::new(None),
        });

        let ticker = tokio::spawn(run_ticks(Arc::downgrade(&torrent), config.clone()));
        *torrent.ticker.lock() = Some(ticker);
        torrent
    }

    /// A torrent nobody seeds: metadata never arrives.
    pub fn dead(info_hash: InfoHash) -> Arc<Self> {
        let (status, _) = watch::channel(TorrentStatus::FetchingMetadata);
        Arc::new(Self {
            info_hash,
            entry: None,
            progress: Mutex::new(Progress::default()),
            status,
            ticker: Mutex::new(None),
        })
    }

    /// Stops the download and reports it as failed.
    pub fn stop(&self, reason: &str) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }
        self.status
            .send_replace(TorrentStatus::Failed(reason.to_string()));
    }

    fn is_ready(&self) -> bool {
        matches!(*self.status.borrow(), TorrentStatus::Ready)
    }

    fn ready_entry(&self) -> Option<&Arc<CatalogEntry>> {
        self.entry.as_ref().filter(|_| self.is_ready())
    }
}

impl Drop for SimulatedTorrent {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.abort();
        }
    }
}

async fn run_ticks(torrent: Weak<SimulatedTorrent>, config: SimulationConfig) {
    tokio::time::sleep(config.metadata_delay).await;

    let (total, seed) = {
        let Some(torrent) = torrent.upgrade() else {
            return;
        };
        let Some(entry) = torrent.entry.as_ref() else {
            return;
        };
        torrent.status.send_replace(TorrentStatus::Ready);
        info!(
            "Simulated metadata ready for {} ({} files)",
            entry.name,
            entry.files.len()
        );

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&torrent.info_hash.as_bytes()[..8]);
        (entry.total_size(), config.seed ^ u64::from_be_bytes(prefix))
    };

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut interval = tokio::time::interval(config.tick_interval);
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(torrent) = torrent.upgrade() else {
            return;
        };

        let mut progress = torrent.progress.lock();
        if progress.peers < config.max_peers {
            progress.peers = (progress.peers + rng.random_range(0..=2)).min(config.max_peers);
        }

        let step = match config.download_speed {
            None => total,
            Some(_) if progress.peers == 0 => 0,
            Some(speed) => bytes_per_tick(speed, config.tick_interval),
        };
        let before = progress.downloaded;
        progress.downloaded = progress.downloaded.saturating_add(step).min(total);
        progress.download_rate = if progress.downloaded > before {
            config.download_speed.unwrap_or(0)
        } else {
            0
        };

        if progress.downloaded == total {
            progress.download_rate = 0;
            debug!("Simulated download of {} complete", torrent.info_hash);
            return;
        }
    }
}

fn bytes_per_tick(speed: u64, tick: Duration) -> u64 {
    ((speed as u128 * tick.as_millis()) / 1000).max(1) as u64
}

#[async_trait]
impl TorrentHandle for SimulatedTorrent {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    fn name(&self) -> Option<String> {
        self.ready_entry().map(|entry| entry.name.clone())
    }

    fn files(&self) -> Option<Vec<FileEntry>> {
        self.ready_entry().map(|entry| {
            entry
                .files
                .iter()
                .enumerate()
                .map(|(index, file)| FileEntry {
                    index,
                    name: file.name.clone(),
                    length: file.length,
                })
                .collect()
        })
    }

    fn stats(&self) -> SwarmStats {
        let progress = self.progress.lock();
        let total = self.entry.as_ref().map(|entry| entry.total_size()).unwrap_or(0);
        SwarmStats {
            peers: progress.peers,
            download_rate: progress.download_rate,
            downloaded: progress.downloaded,
            progress: if total == 0 {
                0.0
            } else {
                progress.downloaded as f64 / total as f64
            },
        }
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
        let entry = self.ready_entry().ok_or(ReadError::NotYetAvailable)?;
        let file = entry.files.get(file_index).ok_or(ReadError::OutOfBounds {
            file_index,
            offset,
            length,
            file_size: 0,
        })?;
        if offset >= file.length {
            return Err(ReadError::OutOfBounds {
                file_index,
                offset,
                length,
                file_size: file.length,
            });
        }

        let global_start = entry.file_offset(file_index) + offset;
        if let Some(corrupt) = entry.corrupt_after
            && global_start >= corrupt
        {
            return Err(ReadError::Storage(format!(
                "simulated corruption at byte {global_start}"
            )));
        }

        let downloaded = self.progress.lock().downloaded;
        if downloaded <= global_start {
            return Err(ReadError::NotYetAvailable);
        }

        let mut available = (length as u64)
            .min(file.length - offset)
            .min(downloaded - global_start);
        if let Some(corrupt) = entry.corrupt_after {
            available = available.min(corrupt - global_start);
        }
        let available = available as usize;

        match &file.source {
            FileSource::Memory(data) => {
                let start = offset as usize;
                Ok(data.slice(start..start + available))
            }
            FileSource::Disk(path) => {
                let storage = |e: std::io::Error| {
                    ReadError::Storage(format!("{}: {}", path.display(), e))
                };
                let mut handle = tokio::fs::File::open(path).await.map_err(storage)?;
                handle
                    .seek(SeekFrom::Start(offset))
                    .await
                    .map_err(storage)?;
                let mut buffer = vec![0u8; available];
                handle.read_exact(&mut buffer).await.map_err(storage)?;
                Ok(Bytes::from(buffer))
            }
        }
    }
}

//! Download engine backed by a fixed catalog.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};
use undertow_core::{DownloadEngine, EngineError, InfoHash, TorrentHandle};

use crate::catalog::Catalog;
use crate::torrent::SimulatedTorrent;

/// Behavior knobs for simulated downloads.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Time from `add` until the file list is published
    pub metadata_delay: Duration,
    /// Bytes per second per torrent; `None` makes everything available at once
    pub download_speed: Option<u64>,
    /// Granularity of the download simulation
    pub tick_interval: Duration,
    /// Peer count ceiling
    pub max_peers: usize,
    /// Seed for the peer ramp
    pub seed: u64,
    /// Fail `add` for ids missing from the catalog instead of never loading them
    pub reject_unknown: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            metadata_delay: Duration::from_millis(500),
            download_speed: Some(5 * 1024 * 1024), // 5 MiB/s
            tick_interval: Duration::from_millis(100),
            max_peers: 20,
            seed: 42,
            reject_unknown: false,
        }
    }
}

impl SimulationConfig {
    /// Metadata and bytes available almost immediately.
    pub fn instant() -> Self {
        Self {
            metadata_delay: Duration::ZERO,
            download_speed: None,
            tick_interval: Duration::from_millis(10),
            ..Self::default()
        }
    }
}

/// Simulated engine serving a catalog.
pub struct SimulatedEngine {
    catalog: Catalog,
    config: SimulationConfig,
    torrents: Mutex<HashMap<InfoHash, Arc<SimulatedTorrent>>>,
    add_calls: AtomicUsize,
    shut_down: AtomicBool,
}

impl SimulatedEngine {
    pub fn new(catalog: Catalog, config: SimulationConfig) -> Self {
        Self {
            catalog,
            config,
            torrents: Mutex::new(HashMap::new()),
            add_calls: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Number of `add` calls received, including rejected ones.
    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    /// Stops every download and refuses new ones.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        for torrent in self.torrents.lock().drain().map(|(_, torrent)| torrent) {
            torrent.stop("engine shut down");
        }
        info!("Simulated engine shut down");
    }
}

#[async_trait]
impl DownloadEngine for SimulatedEngine {
    async fn add(&self, info_hash: InfoHash) -> Result<Arc<dyn TorrentHandle>, EngineError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(EngineError::Shutdown);
        }

        let mut torrents = self.torrents.lock();
        if let Some(torrent) = torrents.get(&info_hash) {
            return Ok(torrent.clone());
        }

        let torrent = match self.catalog.get(&info_hash) {
            Some(entry) => {
                debug!("Starting simulated download of {}", entry.name);
                SimulatedTorrent::start(entry, &self.config)
            }
            None if self.config.reject_unknown => {
                return Err(EngineError::Rejected {
                    info_hash,
                    reason: "not in catalog".to_string(),
                });
            }
            None => {
                debug!("{} is not in the catalog, no peers will answer", info_hash);
                SimulatedTorrent::dead(info_hash)
            }
        };

        torrents.insert(info_hash, torrent.clone());
        Ok(torrent)
    }
}

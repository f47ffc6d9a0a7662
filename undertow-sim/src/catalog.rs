//! Content served by the simulated engine.
//!
//! A catalog maps info hashes to multi-file torrents whose bytes come from
//! memory or from local files. Directory scans turn each folder of videos into
//! one torrent, keyed by the SHA-1 of the folder path so ids stay stable across
//! restarts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use sha1::{Digest, Sha1};
use undertow_core::InfoHash;
use undertow_core::selection::VIDEO_EXTENSIONS;

/// Errors raised while building a catalog from disk.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where a simulated file's bytes live.
#[derive(Debug, Clone)]
pub enum FileSource {
    Memory(Bytes),
    Disk(PathBuf),
}

/// One file inside a simulated torrent.
#[derive(Debug, Clone)]
pub struct CatalogFile {
    pub name: String,
    pub length: u64,
    pub source: FileSource,
}

impl CatalogFile {
    pub fn in_memory(name: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            length: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    pub fn on_disk(name: impl Into<String>, path: PathBuf, length: u64) -> Self {
        Self {
            name: name.into(),
            length,
            source: FileSource::Disk(path),
        }
    }
}

/// A simulated torrent.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub info_hash: InfoHash,
    pub name: String,
    pub files: Vec<CatalogFile>,
    /// Torrent-wide byte offset from which reads fail with a storage error
    pub corrupt_after: Option<u64>,
}

impl CatalogEntry {
    /// Creates an entry whose info hash is derived from `name`.
    pub fn new(name: impl Into<String>, files: Vec<CatalogFile>) -> Self {
        let name = name.into();
        Self {
            info_hash: info_hash_for(&name),
            name,
            files,
            corrupt_after: None,
        }
    }

    pub fn with_info_hash(mut self, info_hash: InfoHash) -> Self {
        self.info_hash = info_hash;
        self
    }

    /// Makes reads at or past `offset` (torrent-wide) fail.
    pub fn corrupt_after(mut self, offset: u64) -> Self {
        self.corrupt_after = Some(offset);
        self
    }

    /// Sum of all file lengths.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.length).sum()
    }

    /// Torrent-wide offset of the first byte of file `index`.
    pub fn file_offset(&self, index: usize) -> u64 {
        self.files.iter().take(index).map(|file| file.length).sum()
    }
}

/// Deterministic info hash for a name or path.
pub fn info_hash_for(key: &str) -> InfoHash {
    let digest = Sha1::digest(key.as_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest);
    InfoHash::new(bytes)
}

/// Immutable set of simulated torrents.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<InfoHash, Arc<CatalogEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing any with the same info hash.
    pub fn insert(&mut self, entry: CatalogEntry) -> InfoHash {
        let info_hash = entry.info_hash;
        self.entries.insert(info_hash, Arc::new(entry));
        info_hash
    }

    pub fn get(&self, info_hash: &InfoHash) -> Option<Arc<CatalogEntry>> {
        self.entries.get(info_hash).cloned()
    }

    /// Entries sorted by name.
    pub fn entries(&self) -> Vec<Arc<CatalogEntry>> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds a catalog from the video files under `dir`.
    ///
    /// Every directory holding at least one video becomes one torrent named
    /// after the directory, with its videos sorted by file name. Hidden and
    /// system directories are skipped.
    ///
    /// # Errors
    /// - `CatalogError::Scan` - A directory or its entries could not be read
    pub async fn scan_directory(dir: &Path) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let scan_error = |source| CatalogError::Scan {
                path: current.clone(),
                source,
            };
            let mut reader = tokio::fs::read_dir(&current).await.map_err(scan_error)?;
            let mut videos = Vec::new();

            while let Some(entry) = reader.next_entry().await.map_err(scan_error)? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(scan_error)?;

                if file_type.is_dir() {
                    if !is_skipped_dir(&path) {
                        pending.push(path);
                    }
                } else if file_type.is_file() && has_video_extension(&path) {
                    let metadata = entry.metadata().await.map_err(scan_error)?;
                    videos.push((path, metadata.len()));
                }
            }

            if videos.is_empty() {
                continue;
            }
            videos.sort();

            let name = current
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| current.display().to_string());
            let files = videos
                .into_iter()
                .map(|(path, length)| {
                    let file_name = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    CatalogFile::on_disk(format!("{name}/{file_name}"), path, length)
                })
                .collect();

            let info_hash = info_hash_for(&current.display().to_string());
            catalog.insert(CatalogEntry::new(name, files).with_info_hash(info_hash));
        }

        tracing::info!(
            "Catalog scan of {} found {} torrents",
            dir.display(),
            catalog.len()
        );
        Ok(catalog)
    }
}

fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.') || name == "Thumbs.db")
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

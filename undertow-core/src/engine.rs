//! Boundary to the peer-to-peer download engine.
//!
//! The gateway never speaks the peer-to-peer protocol itself. It hands an
//! info hash to a [`DownloadEngine`] and gets back an opaque
//! [`TorrentHandle`] that reports metadata, swarm counters, and serves byte
//! reads against files that may still be downloading.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::watch;

/// SHA-1 hash identifying a unique torrent.
///
/// Parsed case-insensitively from its 40 character hex form and always
/// displayed lower-case, so it doubles as the normalized content identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Parses a 40 character hex string, ignoring case.
    ///
    /// # Errors
    /// - `InvalidInfoHash` - Wrong length or non-hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self, InvalidInfoHash> {
        let trimmed = hex_str.trim();
        if trimmed.len() != 40 {
            return Err(InvalidInfoHash {
                input: hex_str.to_string(),
            });
        }

        let mut hash = [0u8; 20];
        hex::decode_to_slice(trimmed, &mut hash).map_err(|_| InvalidInfoHash {
            input: hex_str.to_string(),
        })?;
        Ok(Self(hash))
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl std::str::FromStr for InfoHash {
    type Err = InvalidInfoHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Rejected content identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid info hash: {input:?}")]
pub struct InvalidInfoHash {
    /// The identifier as received.
    pub input: String,
}

/// Individual file within a torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Position of the file in the torrent's file list.
    pub index: usize,
    /// Path of the file inside the torrent, `/` separated.
    pub name: String,
    /// File size in bytes.
    pub length: u64,
}

impl FileEntry {
    /// Last path component of the file name.
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Lower-cased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        let file_name = self.file_name();
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Live swarm counters reported by the engine.
///
/// Read without additional locking; slightly stale values are acceptable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SwarmStats {
    /// Connected peers.
    pub peers: usize,
    /// Current download rate in bytes per second.
    pub download_rate: u64,
    /// Verified bytes downloaded so far.
    pub downloaded: u64,
    /// Completion fraction in `0.0..=1.0`.
    pub progress: f64,
}

/// Engine-side lifecycle of a torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentStatus {
    /// Waiting for the info dictionary from the swarm.
    FetchingMetadata,
    /// File list is known and reads can be served.
    Ready,
    /// The engine gave up on this torrent.
    Failed(String),
}

/// Errors raised by the engine when creating sessions.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine refused the identifier.
    #[error("engine rejected {info_hash}: {reason}")]
    Rejected {
        /// Identifier that was refused.
        info_hash: InfoHash,
        /// Reason given by the engine.
        reason: String,
    },

    /// The engine is no longer running.
    #[error("download engine has shut down")]
    Shutdown,
}

/// Errors raised when reading bytes from a torrent file.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The requested bytes have not been downloaded yet.
    ///
    /// Transient: callers retry after a short delay.
    #[error("requested bytes not yet available")]
    NotYetAvailable,

    /// The read falls outside the file.
    #[error("read at {offset}+{length} outside file {file_index} of size {file_size}")]
    OutOfBounds {
        /// File being read.
        file_index: usize,
        /// Requested starting offset.
        offset: u64,
        /// Requested read length.
        length: usize,
        /// Size of the file.
        file_size: u64,
    },

    /// Underlying storage failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Creates download sessions for info hashes.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Starts (or joins) the download for `info_hash` and returns its handle.
    ///
    /// The returned handle may still be fetching metadata.
    ///
    /// # Errors
    /// - `EngineError::Rejected` - Engine refused the identifier
    /// - `EngineError::Shutdown` - Engine is not running
    async fn add(&self, info_hash: InfoHash) -> Result<Arc<dyn TorrentHandle>, EngineError>;
}

/// Opaque handle to one in-flight download.
#[async_trait]
pub trait TorrentHandle: Send + Sync {
    /// Identifier this handle was created for.
    fn info_hash(&self) -> InfoHash;

    /// Display name from the metadata, once known.
    fn name(&self) -> Option<String>;

    /// File list, `None` until metadata has arrived.
    fn files(&self) -> Option<Vec<FileEntry>>;

    /// Snapshot of the swarm counters.
    fn stats(&self) -> SwarmStats;

    /// Subscribes to lifecycle changes of this torrent.
    fn status(&self) -> watch::Receiver<TorrentStatus>;

    /// Reads up to `length` bytes of file `file_index` starting at `offset`.
    ///
    /// # Errors
    /// - `ReadError::NotYetAvailable` - Bytes are not downloaded yet
    /// - `ReadError::OutOfBounds` - Read outside the file
    /// - `ReadError::Storage` - Storage failure
    async fn read_at(
        &self,
        file_index: usize,
        offset: u64,
        length: usize,
    ) -> Result<Bytes, ReadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_hash_is_case_insensitive() {
        let lower = InfoHash::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();
        let upper = InfoHash::from_hex("0123456789ABCDEF0123456789ABCDEF01234567").unwrap();

        assert_eq!(lower, upper);
        assert_eq!(upper.to_string(), "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn test_info_hash_rejects_malformed_input() {
        assert!(InfoHash::from_hex("abc").is_err());
        assert!(InfoHash::from_hex("zz23456789abcdef0123456789abcdef01234567").is_err());
        assert!("".parse::<InfoHash>().is_err());
    }

    #[test]
    fn test_file_entry_extension() {
        let entry = FileEntry {
            index: 0,
            name: "Show/Episode.01.MKV".to_string(),
            length: 10,
        };
        assert_eq!(entry.file_name(), "Episode.01.MKV");
        assert_eq!(entry.extension().as_deref(), Some("mkv"));

        let hidden = FileEntry {
            index: 1,
            name: ".mp4".to_string(),
            length: 10,
        };
        assert_eq!(hidden.extension(), None);
    }
}

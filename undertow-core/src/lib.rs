//! Undertow Core - Media streaming gateway over peer-to-peer downloads
//!
//! This crate tracks in-flight download sessions, answers HTTP range requests
//! against files that may still be downloading, and runs a per-request
//! transcoding pipeline through an external encoder process. The download
//! engine itself is consumed through the traits in [`engine`].

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod media_info;
pub mod range;
pub mod readiness;
pub mod registry;
pub mod selection;
pub mod session;
pub mod status;
pub mod streaming;
pub mod tracing_setup;
pub mod transcode;

// Re-export main types for convenient access
pub use config::GatewayConfig;
pub use engine::{
    DownloadEngine, EngineError, FileEntry, InfoHash, ReadError, SwarmStats, TorrentHandle,
    TorrentStatus,
};
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use readiness::{Readiness, ReadinessWaiter};
pub use registry::{Lookup, SessionRegistry};
pub use selection::FileSelector;
pub use session::{Session, SessionState};
pub use status::{SessionStatus, StatusReport};
pub use streaming::RangeStreamer;
pub use transcode::TranscodePipeline;

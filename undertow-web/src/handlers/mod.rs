//! HTTP request handlers organized by functionality

pub mod api;
pub mod streaming;

// Re-export handler functions
pub use api::{HealthResponse, StatusResponse, api_health, api_status};
pub use streaming::{
    StreamQuery, stream_file, stream_torrent, transcode_file, transcode_torrent,
};

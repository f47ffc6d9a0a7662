//! Gateway errors and their HTTP mapping.
//!
//! Errors raised before the first response byte become short `text/plain`
//! HTTP responses. Once a body is streaming, failures only end the body.

use std::time::Duration;

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::engine::{EngineError, InfoHash, InvalidInfoHash, ReadError};

/// Errors that can bubble up from any gateway component.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    InvalidContentId(#[from] InvalidInfoHash),

    #[error("Failed to create session for {info_hash}: {source}")]
    SessionCreationFailed {
        info_hash: InfoHash,
        #[source]
        source: EngineError,
    },

    #[error("Download failed for {info_hash}: {reason}")]
    SessionFailed { info_hash: InfoHash, reason: String },

    #[error("No video file found")]
    NoPlayableFile,

    #[error("Range not satisfiable for file of {file_size} bytes")]
    RangeNotSatisfiable { file_size: u64 },

    #[error("Torrent not ready. Start streaming first.")]
    NotReady,

    #[error("No data downloaded within {waited:?}")]
    PlaybackStartTimeout { waited: Duration },

    #[error("Upstream read failed: {0}")]
    UpstreamRead(#[from] ReadError),

    #[error("Failed to start encoder: {0}")]
    EncoderSpawnFailed(#[source] std::io::Error),

    #[error("Encoder exited with {status}")]
    EncoderCrashed { status: String },
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// HTTP status used when this error is reported before streaming starts.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidContentId(_) => StatusCode::BAD_REQUEST,
            GatewayError::SessionCreationFailed { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::SessionFailed { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::NoPlayableFile => StatusCode::NOT_FOUND,
            GatewayError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            GatewayError::NotReady => StatusCode::CONFLICT,
            GatewayError::PlaybackStartTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamRead(_) => StatusCode::BAD_GATEWAY,
            GatewayError::EncoderSpawnFailed(_) | GatewayError::EncoderCrashed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let mut response = (status, self.to_string()).into_response();
        if let GatewayError::RangeNotSatisfiable { file_size } = self
            && let Ok(value) = HeaderValue::from_str(&format!("bytes */{file_size}"))
        {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GatewayError::NoPlayableFile.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(GatewayError::NotReady.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            GatewayError::PlaybackStartTimeout {
                waited: Duration::from_secs(30)
            }
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::EncoderSpawnFailed(std::io::Error::other("missing")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::UpstreamRead(ReadError::Storage("disk".to_string())).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_unsatisfiable_range_response_carries_size() {
        let response = GatewayError::RangeNotSatisfiable { file_size: 1000 }.into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
    }

    #[test]
    fn test_not_ready_message() {
        assert_eq!(
            GatewayError::NotReady.to_string(),
            "Torrent not ready. Start streaming first."
        );
    }
}

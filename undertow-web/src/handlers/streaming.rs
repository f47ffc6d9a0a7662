//! Byte streaming and transcoding endpoints

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::Response;
use serde::Deserialize;
use tracing::info;
use undertow_core::{FileSelector, GatewayError, InfoHash};

use crate::server::AppState;

/// Optional query parameters for stream requests.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Select a file by name instead of the default pick
    pub filename: Option<String>,
}

fn range_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
}

async fn stream(
    state: AppState,
    id: &str,
    file_index: Option<usize>,
    query: StreamQuery,
    headers: &HeaderMap,
) -> Result<Response, GatewayError> {
    let info_hash = InfoHash::from_hex(id)?;
    let selector = FileSelector::from_parts(file_index, query.filename);
    let range = range_header(headers);

    info!(
        "Stream request for {}: selector={:?}, range={:?}",
        info_hash, selector, range
    );
    state.gateway.stream(info_hash, &selector, range).await
}

/// `GET /stream/{id}`
///
/// # Errors
/// Any [`GatewayError`] raised before the first byte.
pub async fn stream_torrent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    stream(state, &id, None, query, &headers).await
}

/// `GET /stream/{id}/{file_index}`
///
/// # Errors
/// Any [`GatewayError`] raised before the first byte.
pub async fn stream_file(
    State(state): State<AppState>,
    Path((id, file_index)): Path<(String, usize)>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    stream(state, &id, Some(file_index), query, &headers).await
}

async fn transcode(
    state: AppState,
    id: &str,
    file_index: Option<usize>,
) -> Result<Response, GatewayError> {
    let info_hash = InfoHash::from_hex(id)?;
    let selector = FileSelector::from_parts(file_index, None);

    info!("Transcode request for {}: selector={:?}", info_hash, selector);
    state.gateway.transcode(info_hash, &selector).await
}

/// `GET /transcode/{id}`
///
/// # Errors
/// - `GatewayError::NotReady` - Stream the torrent first
/// - `GatewayError::EncoderSpawnFailed` - Encoder missing or not executable
pub async fn transcode_torrent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    transcode(state, &id, None).await
}

/// `GET /transcode/{id}/{file_index}`
///
/// # Errors
/// Same as [`transcode_torrent`].
pub async fn transcode_file(
    State(state): State<AppState>,
    Path((id, file_index)): Path<(String, usize)>,
) -> Result<Response, GatewayError> {
    transcode(state, &id, Some(file_index)).await
}

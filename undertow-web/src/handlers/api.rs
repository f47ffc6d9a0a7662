//! JSON endpoints for status polling and health checks

use axum::extract::{Path, State};
use axum::response::Json;
use serde::Serialize;
use undertow_core::{InfoHash, SessionState, SessionStatus, StatusReport};

use crate::server::AppState;

/// Body of `GET /status/{id}`.
///
/// Unknown ids report only the first four fields.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub ready: bool,
    /// Whole percent, 0-100
    pub progress: u8,
    pub peers: usize,
    /// Bytes per second
    pub download_speed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SessionState>,
}

impl StatusResponse {
    pub fn not_found() -> Self {
        Self {
            ready: false,
            progress: 0,
            peers: 0,
            download_speed: 0,
            downloaded: None,
            name: None,
            state: None,
        }
    }
}

impl From<&StatusReport> for StatusResponse {
    fn from(report: &StatusReport) -> Self {
        Self {
            ready: report.is_ready(),
            progress: report.progress_percent(),
            peers: report.peers,
            download_speed: report.download_rate,
            downloaded: Some(report.downloaded_bytes),
            name: report.selected_file_name.clone(),
            state: Some(report.state),
        }
    }
}

impl From<SessionStatus> for StatusResponse {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::NotFound => Self::not_found(),
            SessionStatus::Found(report) => Self::from(&report),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_torrents: usize,
    pub active_transcodes: usize,
}

/// Reports session progress without creating a session.
///
/// An id that is not a valid info hash can never have a session, so it gets
/// the not-found shape like any other unknown id.
pub async fn api_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<StatusResponse> {
    match InfoHash::from_hex(&id) {
        Ok(info_hash) => Json(state.gateway.status(info_hash).into()),
        Err(e) => {
            tracing::debug!("Status for unparseable id: {}", e);
            Json(StatusResponse::not_found())
        }
    }
}

pub async fn api_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_torrents: state.gateway.active_sessions(),
        active_transcodes: state.gateway.transcoder().active_jobs(),
    })
}

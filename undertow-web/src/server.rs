//! HTTP server wiring for the gateway
//!
//! Builds the router over a shared [`Gateway`] and serves it until shutdown.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use undertow_core::Gateway;
use undertow_core::config::ServerConfig;

use crate::handlers::{
    api_health, api_status, stream_file, stream_torrent, transcode_file, transcode_torrent,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// Builds the gateway router with permissive CORS and request tracing.
pub fn build_router(gateway: Arc<Gateway>) -> Router {
    let state = AppState { gateway };

    Router::new()
        .route("/status/{id}", get(api_status))
        .route("/stream/{id}", get(stream_torrent))
        .route("/stream/{id}/{file_index}", get(stream_file))
        .route("/transcode/{id}", get(transcode_torrent))
        .route("/transcode/{id}/{file_index}", get(transcode_file))
        .route("/health", get(api_health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Serves the gateway on an already bound listener.
///
/// # Errors
/// - `ServerError::Serve` - Accept loop failed
pub async fn serve<F>(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(gateway);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Binds the configured address and serves until `shutdown` resolves.
///
/// # Errors
/// - `ServerError::Bind` - Address unavailable
/// - `ServerError::Serve` - Accept loop failed
pub async fn run_server<F>(
    gateway: Arc<Gateway>,
    config: &ServerConfig,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;

    tracing::info!("Undertow gateway listening on http://{}", address);
    serve(listener, gateway, shutdown).await
}

//! Shared fixtures: a simulated catalog, a gateway over it, and request helpers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, header};
use axum::response::Response;
use bytes::Bytes;
use tower::ServiceExt;
use undertow_core::{Gateway, GatewayConfig, InfoHash};
use undertow_sim::{Catalog, CatalogEntry, CatalogFile, SimulatedEngine, SimulationConfig};

pub const MOVIE_LEN: usize = 64 * 1024;

pub struct TestGateway {
    pub engine: Arc<SimulatedEngine>,
    pub gateway: Arc<Gateway>,
    pub router: Router,
    /// Torrent with a trailer, the main title and a sample
    pub bundle: InfoHash,
    /// Bytes of the main title inside `bundle`
    pub movie: Bytes,
}

pub fn pattern(len: usize, modulus: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % modulus) as u8).collect::<Vec<_>>())
}

pub fn bundle_entry(movie: Bytes) -> CatalogEntry {
    CatalogEntry::new(
        "Elephants Dream",
        vec![
            CatalogFile::in_memory("Elephants Dream/trailer.mp4", pattern(4 * 1024, 7)),
            CatalogFile::in_memory("Elephants Dream/movie.mkv", movie),
            CatalogFile::in_memory("Elephants Dream/sample.avi", pattern(1024, 3)),
        ],
    )
}

pub fn test_gateway_with(
    config: GatewayConfig,
    simulation: SimulationConfig,
    movie: Bytes,
) -> TestGateway {
    let mut catalog = Catalog::new();
    let bundle = catalog.insert(bundle_entry(movie.clone()));

    let engine = Arc::new(SimulatedEngine::new(catalog, simulation));
    let gateway = Arc::new(Gateway::new(engine.clone(), config));
    let router = undertow_web::build_router(gateway.clone());

    TestGateway {
        engine,
        gateway,
        router,
        bundle,
        movie,
    }
}

pub fn test_gateway() -> TestGateway {
    test_gateway_with(
        GatewayConfig::for_testing(),
        SimulationConfig::instant(),
        pattern(MOVIE_LEN, 251),
    )
}

pub async fn get(router: &Router, uri: &str, range: Option<&str>) -> Response {
    let mut request = Request::get(uri);
    if let Some(range) = range {
        request = request.header(header::RANGE, range);
    }

    router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Bytes {
    to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Serves the gateway on an ephemeral local port.
pub async fn spawn_server(gateway: Arc<Gateway>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(undertow_web::serve(
        listener,
        gateway,
        std::future::pending::<()>(),
    ));
    address
}

//! Streaming local files through a scanned catalog

use std::sync::Arc;

use axum::http::{StatusCode, header};
use undertow_core::{Gateway, GatewayConfig};
use undertow_sim::{Catalog, SimulatedEngine, SimulationConfig, info_hash_for};

use crate::common::{body_bytes, get, pattern};

#[tokio::test]
async fn test_scanned_directory_streams_largest_video() {
    let root = tempfile::tempdir().unwrap();
    let film = root.path().join("Big Buck Bunny");
    std::fs::create_dir_all(&film).unwrap();

    let main = pattern(200_000, 241);
    std::fs::write(film.join("bbb.mp4"), &main).unwrap();
    std::fs::write(film.join("bbb-sample.mp4"), pattern(5_000, 17)).unwrap();
    std::fs::write(film.join("poster.png"), pattern(900_000, 3)).unwrap();

    let catalog = Catalog::scan_directory(root.path()).await.unwrap();
    let info_hash = info_hash_for(&film.display().to_string());
    assert!(catalog.get(&info_hash).is_some());

    let engine = Arc::new(SimulatedEngine::new(catalog, SimulationConfig::instant()));
    let gateway = Arc::new(Gateway::new(engine, GatewayConfig::for_testing()));
    let router = undertow_web::build_router(gateway);

    let response = get(&router, &format!("/stream/{info_hash}"), Some("bytes=100000-")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE],
        "bytes 100000-199999/200000"
    );
    assert_eq!(body_bytes(response).await, main.slice(100_000..));
}

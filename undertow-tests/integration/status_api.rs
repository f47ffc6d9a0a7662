//! Status JSON for unknown, loading and ready torrents

use std::time::Duration;

use serde_json::json;
use undertow_core::InfoHash;

use crate::common::{body_bytes, body_json, get, test_gateway};

#[tokio::test]
async fn test_unknown_id_has_not_found_shape() {
    let fixture = test_gateway();
    let unknown = InfoHash::new([0x42; 20]);

    let status = body_json(get(&fixture.router, &format!("/status/{unknown}"), None).await).await;

    assert_eq!(
        status,
        json!({"ready": false, "progress": 0, "peers": 0, "downloadSpeed": 0})
    );
}

#[tokio::test]
async fn test_ready_torrent_reports_progress_and_name() {
    let fixture = test_gateway();
    let stream = get(&fixture.router, &format!("/stream/{}", fixture.bundle), None).await;
    body_bytes(stream).await;

    let status = body_json(
        get(&fixture.router, &format!("/status/{}", fixture.bundle), None).await,
    )
    .await;

    assert_eq!(status["ready"], true);
    assert_eq!(status["state"], "ready");
    assert_eq!(status["progress"], 100);
    assert_eq!(status["name"], "movie.mkv");
    let total = fixture.engine.catalog().get(&fixture.bundle).unwrap().total_size();
    assert_eq!(status["downloaded"], total);
}

#[tokio::test]
async fn test_dead_swarm_reports_metadata_loading() {
    let fixture = test_gateway();
    let dead = InfoHash::new([0x0d; 20]);

    // Starts the session; the stream itself gives up after the readiness ceiling
    let router = fixture.router.clone();
    let request = tokio::spawn(async move {
        get(&router, &format!("/stream/{dead}"), None).await.status()
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let status = body_json(get(&fixture.router, &format!("/status/{dead}"), None).await).await;
    assert_eq!(status["ready"], false);
    assert_eq!(status["state"], "metadataLoading");
    assert_eq!(status["peers"], 0);

    request.await.unwrap();
}

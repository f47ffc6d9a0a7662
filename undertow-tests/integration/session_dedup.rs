//! Concurrent requests for one torrent share a single download

use axum::http::StatusCode;
use futures::future::join_all;

use crate::common::{body_bytes, body_json, get, test_gateway};

#[tokio::test]
async fn test_concurrent_streams_start_one_download() {
    let fixture = test_gateway();
    let uri = format!("/stream/{}", fixture.bundle);

    let responses = join_all((0..10).map(|i| {
        let range = format!("bytes={}-{}", i * 100, i * 100 + 99);
        let router = fixture.router.clone();
        let uri = uri.clone();
        async move { get(&router, &uri, Some(&range)).await }
    }))
    .await;

    for response in responses {
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(body_bytes(response).await.len(), 100);
    }
    assert_eq!(fixture.engine.add_calls(), 1);
    assert_eq!(fixture.gateway.active_sessions(), 1);
}

#[tokio::test]
async fn test_mixed_case_ids_share_a_session() {
    let fixture = test_gateway();
    let lower = fixture.bundle.to_string();
    let upper = lower.to_uppercase();

    for id in [&lower, &upper] {
        let response = get(&fixture.router, &format!("/stream/{id}"), Some("bytes=0-9")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    }

    assert_eq!(fixture.engine.add_calls(), 1);
    let health = body_json(get(&fixture.router, "/health", None).await).await;
    assert_eq!(health["activeTorrents"], 1);
}

#[tokio::test]
async fn test_status_polls_never_create_sessions() {
    let fixture = test_gateway();

    for _ in 0..5 {
        let response = get(&fixture.router, &format!("/status/{}", fixture.bundle), None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(fixture.engine.add_calls(), 0);
}

//! Streams gated on metadata: slow metadata, dead swarms and rejected ids

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use serde_json::json;
use undertow_core::{GatewayConfig, InfoHash};
use undertow_sim::SimulationConfig;

use crate::common::{body_bytes, body_json, get, pattern, test_gateway, test_gateway_with};

#[tokio::test]
async fn test_stream_waits_for_slow_metadata() {
    let fixture = test_gateway_with(
        GatewayConfig::for_testing(),
        SimulationConfig {
            metadata_delay: Duration::from_millis(100),
            ..SimulationConfig::instant()
        },
        pattern(8 * 1024, 13),
    );

    let response = get(&fixture.router, &format!("/stream/{}", fixture.bundle), None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, fixture.movie);
}

#[tokio::test]
async fn test_dead_swarm_gives_up_at_ceiling() {
    let fixture = test_gateway();
    let ceiling = fixture.gateway.config().readiness.ceiling;
    let dead = InfoHash::new([0xde; 20]);

    let started = Instant::now();
    let response = get(&fixture.router, &format!("/stream/{dead}"), None).await;
    let elapsed = started.elapsed();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_bytes(response).await, "No video file found");
    assert!(elapsed >= ceiling, "returned after {elapsed:?}");
    assert!(elapsed < ceiling + Duration::from_secs(2), "hung for {elapsed:?}");
}

#[tokio::test]
async fn test_rejected_id_is_bad_gateway() {
    let fixture = test_gateway_with(
        GatewayConfig::for_testing(),
        SimulationConfig {
            reject_unknown: true,
            ..SimulationConfig::instant()
        },
        pattern(1024, 5),
    );
    let unknown = InfoHash::new([0x99; 20]);

    let response = get(&fixture.router, &format!("/stream/{unknown}"), None).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    // A rejected creation leaves nothing behind; the next request retries
    let _ = get(&fixture.router, &format!("/stream/{unknown}"), None).await;
    assert_eq!(fixture.engine.add_calls(), 2);
    assert_eq!(fixture.gateway.active_sessions(), 0);

    let status = body_json(get(&fixture.router, &format!("/status/{unknown}"), None).await).await;
    assert_eq!(
        status,
        json!({"ready": false, "progress": 0, "peers": 0, "downloadSpeed": 0})
    );
}

#[tokio::test]
async fn test_shut_down_engine_fails_stream() {
    let fixture = test_gateway();
    fixture.engine.shutdown();

    let response = get(&fixture.router, &format!("/stream/{}", fixture.bundle), None).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_undownloaded_range_times_out_at_playback_ceiling() {
    let fixture = test_gateway_with(
        GatewayConfig::for_testing(),
        SimulationConfig {
            download_speed: Some(1),
            tick_interval: Duration::from_millis(100),
            ..SimulationConfig::instant()
        },
        pattern(64 * 1024, 29),
    );
    let ceiling = fixture.gateway.config().readiness.playback_start_ceiling;

    let started = Instant::now();
    let response = get(
        &fixture.router,
        &format!("/stream/{}", fixture.bundle),
        Some("bytes=60000-"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() >= ceiling);
    assert!(started.elapsed() < ceiling + Duration::from_secs(2));
}

//! Transcoding through an external encoder, including client disconnects
//!
//! `cat` stands in for the encoder: it reads stdin and writes stdout, which
//! is all the pipeline relies on.

use std::path::PathBuf;
#[cfg(unix)]
use std::time::{Duration, Instant};

use axum::http::{StatusCode, header};
use undertow_core::GatewayConfig;
use undertow_sim::SimulationConfig;

#[cfg(unix)]
use crate::common::TestGateway;
use crate::common::{body_bytes, get, pattern, test_gateway, test_gateway_with};

#[cfg(unix)]
fn cat_gateway(movie_len: usize) -> TestGateway {
    let mut config = GatewayConfig::for_testing();
    config.transcode.program = PathBuf::from("cat");
    config.transcode.args = Vec::new();
    test_gateway_with(config, SimulationConfig::instant(), pattern(movie_len, 239))
}

#[tokio::test]
async fn test_transcode_before_stream_is_409() {
    let fixture = test_gateway();

    let response = get(&fixture.router, &format!("/transcode/{}", fixture.bundle), None).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_bytes(response).await,
        "Torrent not ready. Start streaming first."
    );
    assert_eq!(fixture.engine.add_calls(), 0);
}

#[tokio::test]
async fn test_missing_encoder_is_500() {
    let mut config = GatewayConfig::for_testing();
    config.transcode.program = PathBuf::from("/nonexistent/undertow-encoder");
    let fixture = test_gateway_with(config, SimulationConfig::instant(), pattern(2048, 11));

    let stream = get(&fixture.router, &format!("/stream/{}", fixture.bundle), None).await;
    body_bytes(stream).await;

    let response = get(&fixture.router, &format!("/transcode/{}", fixture.bundle), None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(fixture.gateway.transcoder().active_jobs(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_transcode_streams_encoder_output() {
    let fixture = cat_gateway(300_000);
    let stream = get(&fixture.router, &format!("/stream/{}", fixture.bundle), None).await;
    body_bytes(stream).await;

    let response = get(&fixture.router, &format!("/transcode/{}/1", fixture.bundle), None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
    assert_eq!(body_bytes(response).await, fixture.movie);
    assert_eq!(fixture.gateway.transcoder().active_jobs(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_client_disconnect_kills_encoder() {
    let fixture = cat_gateway(16 * 1024 * 1024);
    let address = crate::common::spawn_server(fixture.gateway.clone()).await;
    let client = reqwest::Client::new();

    let stream = client
        .get(format!("http://{address}/stream/{}", fixture.bundle))
        .header(header::RANGE.as_str(), "bytes=0-0")
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status().as_u16(), 206);
    stream.bytes().await.unwrap();

    let mut response = client
        .get(format!("http://{address}/transcode/{}", fixture.bundle))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let first = response.chunk().await.unwrap().unwrap();
    assert!(!first.is_empty());
    assert_eq!(fixture.gateway.transcoder().active_jobs(), 1);

    drop(response);
    drop(client);

    let deadline = Instant::now() + Duration::from_secs(5);
    while fixture.gateway.transcoder().active_jobs() > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(
        fixture.gateway.transcoder().active_jobs(),
        0,
        "encoder outlived its connection"
    );
}

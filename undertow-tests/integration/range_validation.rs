//! Range requests over HTTP against a fully downloaded torrent

use axum::http::{StatusCode, header};

use crate::common::{MOVIE_LEN, body_bytes, get, test_gateway};

#[tokio::test]
async fn test_valid_ranges_return_partial_content() {
    let fixture = test_gateway();
    let uri = format!("/stream/{}", fixture.bundle);
    let size = MOVIE_LEN as u64;

    for (start, end) in [(0, 0), (0, 1023), (1000, 40_000), (size - 1, size - 1)] {
        let response = get(&fixture.router, &uri, Some(&format!("bytes={start}-{end}"))).await;

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            format!("bytes {start}-{end}/{size}")
        );
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            (end - start + 1).to_string()
        );

        let body = body_bytes(response).await;
        assert_eq!(body, fixture.movie.slice(start as usize..=end as usize));
    }
}

#[tokio::test]
async fn test_open_and_suffix_ranges() {
    let fixture = test_gateway();
    let uri = format!("/stream/{}", fixture.bundle);

    let open = get(&fixture.router, &uri, Some("bytes=60000-")).await;
    assert_eq!(
        open.headers()[header::CONTENT_RANGE],
        format!("bytes 60000-{}/{}", MOVIE_LEN - 1, MOVIE_LEN)
    );
    assert_eq!(body_bytes(open).await.len(), MOVIE_LEN - 60_000);

    let suffix = get(&fixture.router, &uri, Some("bytes=-500")).await;
    assert_eq!(suffix.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body_bytes(suffix).await, fixture.movie.slice(MOVIE_LEN - 500..));
}

#[tokio::test]
async fn test_range_beyond_file_is_416() {
    let fixture = test_gateway();
    let uri = format!("/stream/{}", fixture.bundle);

    let response = get(&fixture.router, &uri, Some(&format!("bytes={MOVIE_LEN}-"))).await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE],
        format!("bytes */{MOVIE_LEN}")
    );
}

#[tokio::test]
async fn test_malformed_range_serves_whole_file() {
    let fixture = test_gateway();
    let uri = format!("/stream/{}", fixture.bundle);

    for range in ["bytes=abc-", "chunks=0-10", "bytes=0-10,20-30"] {
        let response = get(&fixture.router, &uri, Some(range)).await;
        assert_eq!(response.status(), StatusCode::OK, "{range}");
        assert_eq!(body_bytes(response).await.len(), MOVIE_LEN);
    }
}

#[tokio::test]
async fn test_inverted_range_serves_whole_file() {
    let fixture = test_gateway();
    let uri = format!("/stream/{}", fixture.bundle);

    let response = get(&fixture.router, &uri, Some("bytes=50-10")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::CONTENT_RANGE).is_none());
    assert_eq!(body_bytes(response).await, fixture.movie);
}

#[tokio::test]
async fn test_file_index_and_filename_selection() {
    let fixture = test_gateway();

    let by_index = get(&fixture.router, &format!("/stream/{}/2", fixture.bundle), None).await;
    assert_eq!(by_index.status(), StatusCode::OK);
    assert_eq!(by_index.headers()[header::CONTENT_TYPE], "video/x-msvideo");
    assert_eq!(body_bytes(by_index).await.len(), 1024);

    let by_name = get(
        &fixture.router,
        &format!("/stream/{}?filename=trailer.mp4", fixture.bundle),
        None,
    )
    .await;
    assert_eq!(by_name.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(body_bytes(by_name).await.len(), 4 * 1024);

    let missing = get(&fixture.router, &format!("/stream/{}/9", fixture.bundle), None).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

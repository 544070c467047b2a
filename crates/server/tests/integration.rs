use axum::http::{header, HeaderValue, Method, StatusCode};
use axum_test::TestServer;
use hlsgate_server::routes::build_router;
use hlsgate_server::state::AppState;
use hlsgate_transcoder::registry::StreamRegistry;
use hlsgate_transcoder::TranscoderConfig;
use serde_json::Value;

/// Create a test server with its own transcode dir. The media tool paths
/// point nowhere, so every probe attempt fails fast; tests either stop
/// before the probe or assert on that failure.
fn test_app(tag: &str, max_concurrent: usize, strict_http_status: bool) -> (TestServer, TranscoderConfig) {
    let config = TranscoderConfig {
        transcode_dir: std::env::temp_dir()
            .join(format!("hlsgate_it_{tag}_{}", std::process::id())),
        max_concurrent,
        ..Default::default()
    };
    std::fs::create_dir_all(&config.transcode_dir).unwrap();

    let state = AppState {
        registry: StreamRegistry::new(config.clone()),
        strict_http_status,
    };
    (TestServer::new(build_router(state)).unwrap(), config)
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let (server, _) = test_app("health", 3, false);
    let resp = server.get("/health").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_streams"], 0);
}

#[tokio::test]
async fn watch_without_url_is_500() {
    let (server, _) = test_app("nourl", 3, false);
    let resp = server.get("/watch.m3u8").await;
    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "internal_error");
}

#[tokio::test]
async fn watch_without_url_strict_is_400() {
    let (server, _) = test_app("nourl_strict", 3, true);
    let resp = server.get("/watch.m3u8").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn watch_at_capacity_is_500() {
    let (server, _) = test_app("full", 0, false);
    let resp = server
        .get("/watch.m3u8")
        .add_query_param("url", "rtsp://camera.local/stream")
        .await;
    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "internal_error");
}

#[tokio::test]
async fn watch_at_capacity_strict_is_503() {
    let (server, _) = test_app("full_strict", 0, true);
    let resp = server
        .get("/watch.m3u8")
        .add_query_param("url", "rtsp://camera.local/stream")
        .await;
    resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "service_unavailable");
}

#[tokio::test]
async fn watch_with_unreachable_upstream_is_500_and_admits_nothing() {
    let (server, _) = test_app("badprobe", 3, false);
    let resp = server
        .get("/watch.m3u8")
        .add_query_param("url", "rtsp://camera.local/stream")
        .await;
    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    // The failed stream must not stay registered.
    let health: Value = server.get("/health").await.json();
    assert_eq!(health["active_streams"], 0);
}

#[tokio::test]
async fn segment_without_file_param_is_500() {
    let (server, _) = test_app("nofile", 3, false);
    let resp = server.get("/segment.ts").await;
    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn segment_with_malformed_name_is_400() {
    let (server, _) = test_app("badname", 3, false);
    for bad in ["nope", "../../etc/passwd", "abcdef01.ts", "abcdef01x.ts"] {
        let resp = server
            .get("/segment.ts")
            .add_query_param("file", bad)
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert_eq!(body["error"]["code"], "bad_request");
    }
}

#[tokio::test]
async fn segment_for_unknown_stream_is_404() {
    let (server, _) = test_app("unknown", 3, false);
    let resp = server
        .get("/segment.ts")
        .add_query_param("file", "abcdef010.ts")
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn segment_already_on_disk_is_served() {
    let (server, config) = test_app("ondisk", 3, false);
    std::fs::write(config.segment_path("abcdef013.ts"), b"ts-bytes").unwrap();

    let resp = server
        .get("/segment.ts")
        .add_query_param("file", "abcdef013.ts")
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.header(header::CONTENT_TYPE), "video/MP2T");
    assert_eq!(resp.as_bytes().as_ref(), b"ts-bytes");

    std::fs::remove_dir_all(&config.transcode_dir).unwrap();
}

#[tokio::test]
async fn responses_carry_cors_allow_origin() {
    let (server, _) = test_app("cors", 3, false);
    let resp = server
        .get("/health")
        .add_header(
            header::ORIGIN,
            HeaderValue::from_static("http://player.local"),
        )
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.header("access-control-allow-origin"), "*");
}

#[tokio::test]
async fn bare_options_is_200_on_any_path() {
    let (server, _) = test_app("bare_options", 3, false);
    // No Access-Control-Request-Method header: not a preflight, so the CORS
    // layer lets it through and the router itself must answer 200.
    for path in ["/watch.m3u8", "/segment.ts", "/health", "/anything/else"] {
        let resp = server
            .method(Method::OPTIONS, path)
            .add_header(
                header::ORIGIN,
                HeaderValue::from_static("http://player.local"),
            )
            .await;
        resp.assert_status_ok();
        assert_eq!(resp.header("access-control-allow-origin"), "*");
    }
}

#[tokio::test]
async fn preflight_options_is_answered() {
    let (server, _) = test_app("preflight", 3, false);
    let resp = server
        .method(Method::OPTIONS, "/watch.m3u8")
        .add_header(
            header::ORIGIN,
            HeaderValue::from_static("http://player.local"),
        )
        .add_header(
            header::ACCESS_CONTROL_REQUEST_METHOD,
            HeaderValue::from_static("GET"),
        )
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.header("access-control-allow-origin"), "*");
}

use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;
use crate::streaming;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::RANGE, header::ORIGIN]);

    Router::new()
        .route("/health", get(health))
        .route("/watch.m3u8", get(streaming::watch_playlist))
        .route("/segment.ts", get(streaming::serve_segment))
        // OPTIONS must get a 200 on any path, preflight or not. CorsLayer
        // only short-circuits real preflights (those carrying
        // Access-Control-Request-Method), so bare OPTIONS lands in these
        // fallbacks instead of a 404/405.
        .fallback(unmatched_path)
        .method_not_allowed_fallback(unmatched_method)
        .layer(cors)
        .with_state(state)
}

async fn unmatched_path(method: Method) -> StatusCode {
    if method == Method::OPTIONS {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn unmatched_method(method: Method) -> StatusCode {
    if method == Method::OPTIONS {
        StatusCode::OK
    } else {
        StatusCode::METHOD_NOT_ALLOWED
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    active_streams: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_streams: state.registry.active_count().await,
    })
}

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use hlsgate_core::error::ApiError;
use hlsgate_transcoder::poller::SegmentPoller;
use hlsgate_transcoder::TranscodeError;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::state::AppState;

/// Content-Type for HLS playlists.
const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Content-Type for MPEG-TS segments.
const SEGMENT_CONTENT_TYPE: &str = "video/MP2T";

#[derive(Deserialize)]
pub struct WatchQuery {
    url: Option<String>,
}

#[derive(Deserialize)]
pub struct SegmentQuery {
    file: Option<String>,
}

/// GET /watch.m3u8?url=<upstream>
///
/// Admits a new stream, probes the upstream and answers with the synthesized
/// VOD manifest before a single segment exists.
pub async fn watch_playlist(
    State(state): State<AppState>,
    Query(query): Query<WatchQuery>,
) -> Result<Response, ApiError> {
    let url = query
        .url
        .ok_or_else(|| missing_query_error("url", state.strict_http_status))?;

    let (stream, manifest) = state
        .registry
        .open(&url)
        .await
        .map_err(|e| to_api_error(e, state.strict_http_status))?;

    debug!(identifier = %stream.identifier, "serving synthesized manifest");

    Ok((
        [(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)],
        Body::from(manifest),
    )
        .into_response())
}

/// GET /segment.ts?file=<identifier><index>.ts
///
/// Polls until the requested segment file appears (restarting the transcoder
/// if it has fallen behind) and streams its bytes straight from disk.
pub async fn serve_segment(
    State(state): State<AppState>,
    Query(query): Query<SegmentQuery>,
) -> Result<Response, ApiError> {
    let filename = query
        .file
        .ok_or_else(|| missing_query_error("file", state.strict_http_status))?;

    let mut poller = SegmentPoller::new(&filename, state.registry.clone())
        .map_err(|e| to_api_error(e, state.strict_http_status))?;

    let file = poller
        .wait_for_segment()
        .await
        .map_err(|e| to_api_error(e, state.strict_http_status))?;

    let stream = ReaderStream::new(file);

    Ok((
        [(header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE)],
        Body::from_stream(stream),
    )
        .into_response())
}

fn missing_query_error(name: &str, strict: bool) -> ApiError {
    let message = format!("missing '{name}' query parameter");
    if strict {
        ApiError::BadRequest(message)
    } else {
        ApiError::Internal(message)
    }
}

fn to_api_error(e: TranscodeError, strict: bool) -> ApiError {
    match e {
        TranscodeError::MaxStreamsReached(_) if strict => {
            ApiError::ServiceUnavailable(e.to_string())
        }
        TranscodeError::SegmentTimeout(_) if strict => ApiError::GatewayTimeout(e.to_string()),
        TranscodeError::StreamNotFound(_) => ApiError::NotFound(e.to_string()),
        TranscodeError::InvalidSegmentName(_) => ApiError::BadRequest(e.to_string()),
        other => ApiError::Internal(other.to_string()),
    }
}

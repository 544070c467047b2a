use std::sync::Arc;

use hlsgate_transcoder::registry::StreamRegistry;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<StreamRegistry>,
    /// When false (the default), admission, missing-query and poller-timeout
    /// failures all surface as 500 for compatibility with existing clients;
    /// when true they map to 503, 400 and 504.
    pub strict_http_status: bool,
}

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hlsgate_transcoder::registry::StreamRegistry;
use hlsgate_transcoder::TranscoderConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let debug_logging = env_flag("HLSGATE_DEBUG");

    // Initialize tracing
    let default_filter = if debug_logging { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let defaults = TranscoderConfig::default();
    let config = TranscoderConfig {
        ffmpeg_path: env_path("HLSGATE_FFMPEG", defaults.ffmpeg_path),
        ffprobe_path: env_path("HLSGATE_FFPROBE", defaults.ffprobe_path),
        transcode_dir: env_path("HLSGATE_TRANSCODE_DIR", defaults.transcode_dir),
        segment_secs: env_parsed("HLSGATE_SEGMENT_SECS", defaults.segment_secs),
        max_gap: env_parsed("HLSGATE_MAX_GAP", defaults.max_gap),
        self_destruct_secs: env_parsed("HLSGATE_SELF_DESTRUCT_SECS", defaults.self_destruct_secs),
        max_concurrent: env_parsed("HLSGATE_MAX_STREAMS", defaults.max_concurrent),
    };

    std::fs::create_dir_all(&config.transcode_dir).context("failed to create transcode dir")?;
    info!(
        transcode_dir = %config.transcode_dir.display(),
        segment_secs = config.segment_secs,
        max_streams = config.max_concurrent,
        "transcoder configured"
    );

    let registry = StreamRegistry::new(config);

    let state = hlsgate_server::state::AppState {
        registry,
        strict_http_status: env_flag("HLSGATE_STRICT_STATUS"),
    };

    let app = hlsgate_server::routes::build_router(state);

    let port: u16 = env_parsed("HLSGATE_PORT", 8000);
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context("failed to bind")?;
    info!(addr = %bind_addr, "gateway listening");

    axum::serve(listener, app).await?;
    Ok(())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn env_path(name: &str, default: std::path::PathBuf) -> std::path::PathBuf {
    std::env::var(name).map(Into::into).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

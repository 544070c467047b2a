//! ffmpeg child process driver.

use std::process::Stdio;

use tokio::process::Child;
use tracing::info;

use crate::{TranscodeError, TranscoderConfig};

/// User agent announced to the upstream RTSP server.
const USER_AGENT: &str = "hlsgate";

/// Build the full ffmpeg argument vector for one transcoder run.
///
/// Video is copied, audio is transcoded to AAC, and the segment muxer writes
/// `<identifier><index>.ts` files plus a live `<identifier>.m3u8` list. When
/// the run starts mid-stream (`start_segment > 0`) the input is seeked and
/// the output numbering/timestamps are offset so segment files and PTS line
/// up with the synthesized manifest.
pub fn transcode_args(
    config: &TranscoderConfig,
    identifier: &str,
    source_url: &str,
    start_segment: u64,
) -> Vec<String> {
    let offset_secs = start_segment * u64::from(config.segment_secs);

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-y".into(),
        // Input options
        "-rtsp_transport".into(),
        "udp".into(),
        "-fflags".into(),
        "+genpts".into(),
        "-noaccurate_seek".into(),
        "-max_delay".into(),
        "0".into(),
        "-user_agent".into(),
        USER_AGENT.into(),
    ];

    if start_segment > 0 {
        args.extend(["-ss".into(), offset_secs.to_string()]);
    }

    args.extend(["-i".into(), source_url.into()]);

    // Output options
    args.extend([
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-f".into(),
        "segment".into(),
        "-segment_time".into(),
        config.segment_secs.to_string(),
        "-segment_start_number".into(),
        start_segment.to_string(),
        "-segment_list".into(),
        config
            .live_playlist_path(identifier)
            .to_string_lossy()
            .into_owned(),
        "-segment_list_type".into(),
        "m3u8".into(),
        "-break_non_keyframes".into(),
        "1".into(),
        "-avoid_negative_ts".into(),
        "disabled".into(),
        "-flags".into(),
        "-global_header".into(),
        "-vsync".into(),
        "0".into(),
    ]);

    if start_segment > 0 {
        args.extend(["-initial_offset".into(), offset_secs.to_string()]);
    }

    args.push(
        config
            .transcode_dir
            .join(format!("{identifier}%d.ts"))
            .to_string_lossy()
            .into_owned(),
    );

    args
}

/// Spawn the transcoder child. stderr goes to a per-stream log file under the
/// transcode dir so the cleanup sweep removes it with the segments.
pub async fn spawn_transcoder(
    config: &TranscoderConfig,
    identifier: &str,
    source_url: &str,
    start_segment: u64,
) -> Result<Child, TranscodeError> {
    tokio::fs::create_dir_all(&config.transcode_dir).await?;

    let args = transcode_args(config, identifier, source_url, start_segment);

    let log_file = std::fs::File::create(config.log_path(identifier))
        .map_err(|e| TranscodeError::FfmpegFailed(format!("create log: {e}")))?;

    let child = tokio::process::Command::new(&config.ffmpeg_path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log_file))
        .spawn()
        .map_err(|e| TranscodeError::FfmpegFailed(format!("spawn: {e}")))?;

    info!(identifier, start_segment, ?args, "spawned transcoder");
    Ok(child)
}

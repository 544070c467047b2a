use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::TranscodeError;

/// Upstream media summary extracted via ffprobe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeInfo {
    pub container: String,
    pub duration_secs: f64,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
}

/// Run ffprobe against the upstream URL and parse the JSON output.
pub async fn probe(ffprobe_path: &Path, url: &str) -> Result<ProbeInfo, TranscodeError> {
    let output = tokio::process::Command::new(ffprobe_path)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(url)
        .output()
        .await
        .map_err(|e| TranscodeError::ProbeFailed(format!("spawn failed: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TranscodeError::ProbeFailed(stderr.into_owned()));
    }

    let raw: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| TranscodeError::ProbeFailed(format!("parse JSON: {e}")))?;

    parse_probe_output(&raw)
}

fn parse_probe_output(raw: &serde_json::Value) -> Result<ProbeInfo, TranscodeError> {
    let format = raw
        .get("format")
        .ok_or_else(|| TranscodeError::ProbeFailed("missing 'format'".into()))?;

    let container = format
        .get("format_name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    // The whole VOD manifest is synthesized from this one number; a source
    // without a parsable duration cannot be served.
    let duration_secs: f64 = format
        .get("duration")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TranscodeError::ProbeFailed("missing container duration".into()))?;

    let streams = raw
        .get("streams")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut video_codec = None;
    let mut audio_codec = None;

    for s in &streams {
        let codec_type = s.get("codec_type").and_then(|v| v.as_str()).unwrap_or("");
        let codec = s
            .get("codec_name")
            .and_then(|v| v.as_str())
            .map(|c| c.to_string());

        match codec_type {
            "video" if video_codec.is_none() => video_codec = codec,
            "audio" if audio_codec.is_none() => audio_codec = codec,
            _ => {}
        }
    }

    Ok(ProbeInfo {
        container,
        duration_secs,
        video_codec,
        audio_codec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_probe_json() {
        let json = serde_json::json!({
            "format": {
                "format_name": "rtsp",
                "duration": "12.500000"
            },
            "streams": [
                {
                    "index": 0,
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080
                },
                {
                    "index": 1,
                    "codec_type": "audio",
                    "codec_name": "pcm_mulaw",
                    "channels": 1
                }
            ]
        });

        let info = parse_probe_output(&json).unwrap();
        assert_eq!(info.container, "rtsp");
        assert!((info.duration_secs - 12.5).abs() < 0.001);
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.audio_codec.as_deref(), Some("pcm_mulaw"));
    }

    #[test]
    fn parse_probe_without_duration_fails() {
        let json = serde_json::json!({
            "format": { "format_name": "rtsp" },
            "streams": []
        });
        assert!(matches!(
            parse_probe_output(&json),
            Err(TranscodeError::ProbeFailed(_))
        ));
    }

    #[test]
    fn parse_probe_with_unparsable_duration_fails() {
        let json = serde_json::json!({
            "format": { "format_name": "rtsp", "duration": "N/A" }
        });
        assert!(parse_probe_output(&json).is_err());
    }

    #[test]
    fn parse_probe_without_format_fails() {
        let json = serde_json::json!({ "streams": [] });
        assert!(parse_probe_output(&json).is_err());
    }
}

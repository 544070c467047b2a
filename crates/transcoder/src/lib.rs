pub mod driver;
pub mod playlist;
pub mod poller;
pub mod probe;
pub mod registry;
pub mod stream;

use std::path::PathBuf;
use thiserror::Error;

/// Length of the filename-safe stream identifier. Every artifact name is
/// `<identifier><suffix>`, and segment requests are parsed by slicing this
/// prefix, so the length is fixed.
pub const IDENTIFIER_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("ffprobe failed: {0}")]
    ProbeFailed(String),
    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),
    #[error("stream not found: {0}")]
    StreamNotFound(String),
    #[error("max concurrent streams reached ({0})")]
    MaxStreamsReached(usize),
    #[error("invalid segment name: {0}")]
    InvalidSegmentName(String),
    #[error("segment {0} did not appear in time")]
    SegmentTimeout(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Global transcoder configuration.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub transcode_dir: PathBuf,
    /// Target segment length in seconds.
    pub segment_secs: u32,
    /// Minimum requested-minus-produced segment gap that forces a restart.
    pub max_gap: u64,
    /// Idle seconds before a stream tears itself down.
    pub self_destruct_secs: u64,
    pub max_concurrent: usize,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg_build/ffmpeg"),
            ffprobe_path: PathBuf::from("ffmpeg_build/ffprobe"),
            transcode_dir: PathBuf::from("transcoding-tmp"),
            segment_secs: 5,
            max_gap: 3,
            self_destruct_secs: 60,
            max_concurrent: 3,
        }
    }
}

impl TranscoderConfig {
    /// Synthesized VOD manifest served to clients.
    pub fn master_playlist_path(&self, identifier: &str) -> PathBuf {
        self.transcode_dir.join(format!("{identifier}_master.m3u8"))
    }

    /// Manifest written by ffmpeg itself; read for gap analysis, never served.
    pub fn live_playlist_path(&self, identifier: &str) -> PathBuf {
        self.transcode_dir.join(format!("{identifier}.m3u8"))
    }

    /// Path of a segment file by its full `<identifier><index>.ts` name.
    pub fn segment_path(&self, filename: &str) -> PathBuf {
        self.transcode_dir.join(filename)
    }

    /// ffmpeg stderr log for one transcoder run. Shares the stream prefix so
    /// the cleanup sweep removes it with the segments.
    pub fn log_path(&self, identifier: &str) -> PathBuf {
        self.transcode_dir.join(format!("{identifier}.log"))
    }
}

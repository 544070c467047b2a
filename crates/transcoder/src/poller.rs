//! Per-request segment polling.
//!
//! A poller waits for one segment file to appear on disk. When the transcoder
//! has fallen too far behind the requested index (the client seeked), the
//! poller kills it and respawns it at the requested segment.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::registry::StreamRegistry;
use crate::stream::Stream;
use crate::{playlist, TranscodeError, TranscoderConfig, IDENTIFIER_LEN};

/// Delay between poll attempts.
const POLL_PERIOD: Duration = Duration::from_secs(1);

static SEGMENT_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9A-Za-z]{8})(\d+)\.ts").unwrap());

/// State machine for one `/segment.ts` request.
pub struct SegmentPoller {
    filename: String,
    identifier: String,
    segment_index: u64,
    registry: Arc<StreamRegistry>,
    max_gap: u64,
    attempts: u32,
    max_attempts: u32,
    transcode_starting: bool,
    new_transcoder_started: bool,
}

impl SegmentPoller {
    pub fn new(filename: &str, registry: Arc<StreamRegistry>) -> Result<Self, TranscodeError> {
        let (identifier, segment_index) = playlist::parse_segment_name(filename)
            .ok_or_else(|| TranscodeError::InvalidSegmentName(filename.to_string()))?;
        let config = registry.config();
        let max_attempts = (2 * config.segment_secs).max(10);
        let max_gap = config.max_gap;
        Ok(Self {
            filename: filename.to_string(),
            identifier,
            segment_index,
            registry,
            max_gap,
            attempts: 0,
            max_attempts,
            transcode_starting: false,
            new_transcoder_started: false,
        })
    }

    /// Wait until the requested segment exists and return an open handle to
    /// it. The handle stays readable even if a cleanup sweep unlinks the file
    /// while the response is still streaming.
    pub async fn wait_for_segment(&mut self) -> Result<tokio::fs::File, TranscodeError> {
        loop {
            let path = self.registry.config().segment_path(&self.filename);
            if let Ok(file) = tokio::fs::File::open(&path).await {
                debug!(file = %self.filename, attempts = self.attempts, "segment ready");
                return Ok(file);
            }

            let stream = self
                .registry
                .get(&self.identifier)
                .await
                .ok_or_else(|| TranscodeError::StreamNotFound(self.identifier.clone()))?;
            stream.touch().await;

            if self.should_start_transcode(&stream).await && !self.new_transcoder_started {
                self.transcode_starting = true;
                self.new_transcoder_started = true;
                info!(
                    identifier = %self.identifier,
                    segment = self.segment_index,
                    "transcoder behind requested segment, restarting"
                );
                stream.restart(self.segment_index).await?;
                self.transcode_starting = false;
            }

            self.attempts += 1;
            if self.attempts >= self.max_attempts {
                return Err(TranscodeError::SegmentTimeout(self.filename.clone()));
            }
            tokio::time::sleep(POLL_PERIOD).await;
        }
    }

    async fn should_start_transcode(&self, stream: &Arc<Stream>) -> bool {
        if self.transcode_starting {
            return false;
        }
        if !stream.has_live_transcoder().await {
            return true;
        }
        if self.new_transcoder_started {
            return false;
        }
        let produced = current_transcoding_index(self.registry.config(), &self.identifier).await;
        self.decide_gap(produced)
    }

    fn decide_gap(&self, produced: u64) -> bool {
        self.segment_index.saturating_sub(produced) >= self.max_gap
    }
}

/// Highest segment index the transcoder has produced so far.
///
/// The ffmpeg-written playlist is authoritative (appended per segment close)
/// but may be momentarily unreadable during rotation, so a directory scan
/// backs it up. Both failing means nothing was produced yet: 0.
pub async fn current_transcoding_index(config: &TranscoderConfig, identifier: &str) -> u64 {
    match index_from_live_playlist(config, identifier).await {
        Ok(index) => index,
        Err(e) => {
            debug!(identifier, error = %e, "live playlist unreadable, scanning segment files");
            index_from_segment_files(config, identifier)
                .await
                .unwrap_or(0)
        }
    }
}

/// Last `<identifier><index>.ts` reference in the ffmpeg-written playlist,
/// in file order. A readable playlist without references yields 0.
async fn index_from_live_playlist(
    config: &TranscoderConfig,
    identifier: &str,
) -> Result<u64, TranscodeError> {
    let body = tokio::fs::read_to_string(config.live_playlist_path(identifier)).await?;
    let index = SEGMENT_REF_RE
        .captures_iter(&body)
        .filter(|c| &c[1] == identifier)
        .filter_map(|c| c[2].parse().ok())
        .last()
        .unwrap_or(0);
    Ok(index)
}

/// Lexicographically last `<identifier>*.ts` entry under the transcode dir,
/// index parsed from the basename after the identifier prefix.
async fn index_from_segment_files(
    config: &TranscoderConfig,
    identifier: &str,
) -> Option<u64> {
    let mut entries = tokio::fs::read_dir(&config.transcode_dir).await.ok()?;
    let mut last: Option<String> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(identifier) && name.ends_with(".ts") {
            if last.as_deref().map_or(true, |l| name.as_str() > l) {
                last = Some(name);
            }
        }
    }
    let name = last?;
    name.strip_suffix(".ts")?[IDENTIFIER_LEN..].parse().ok()
}

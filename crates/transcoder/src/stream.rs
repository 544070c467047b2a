//! Per-stream supervision: spawn protocol, activity tracking, self-destruct.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::registry::StreamRegistry;
use crate::{driver, playlist, probe, TranscodeError, TranscoderConfig};

/// Self-destruct check period.
const TICK_PERIOD: Duration = Duration::from_secs(5);

/// One upstream session and its supervised transcoder child.
#[derive(Debug)]
pub struct Stream {
    pub identifier: String,
    pub source_url: String,
    config: TranscoderConfig,
    registry: Weak<StreamRegistry>,
    state: Mutex<StreamState>,
    /// Serializes kill-then-spawn sequences so a restart never interleaves
    /// with another spawn for the same stream.
    spawn_gate: Mutex<()>,
    finished: AtomicBool,
}

#[derive(Debug)]
struct StreamState {
    seek_start_segment: u64,
    transcoder: Option<Child>,
    last_activity: Instant,
    ticker: Option<JoinHandle<()>>,
}

impl Stream {
    pub(crate) fn new(
        identifier: String,
        source_url: String,
        config: TranscoderConfig,
        registry: Weak<StreamRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            identifier,
            source_url,
            config,
            registry,
            state: Mutex::new(StreamState {
                seek_start_segment: 0,
                transcoder: None,
                last_activity: Instant::now(),
                ticker: None,
            }),
            spawn_gate: Mutex::new(()),
            finished: AtomicBool::new(false),
        })
    }

    /// Probe the upstream, persist the synthesized VOD manifest and launch
    /// the transcoder at the current seek position. Returns the manifest
    /// body; any error means no transcoder was left running for this call.
    pub async fn start(self: &Arc<Self>) -> Result<String, TranscodeError> {
        let _gate = self.spawn_gate.lock().await;
        self.start_locked().await
    }

    /// Kill the current transcoder (if any) and start a new one at
    /// `start_segment`. The previous child is fully signalled and reaped
    /// before the new spawn begins.
    pub async fn restart(self: &Arc<Self>, start_segment: u64) -> Result<(), TranscodeError> {
        let _gate = self.spawn_gate.lock().await;
        {
            let mut state = self.state.lock().await;
            if let Some(ticker) = state.ticker.take() {
                ticker.abort();
            }
            if let Some(mut child) = state.transcoder.take() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
            state.seek_start_segment = start_segment;
        }
        info!(identifier = %self.identifier, start_segment, "restarting transcoder");
        self.start_locked().await.map(drop)
    }

    async fn start_locked(self: &Arc<Self>) -> Result<String, TranscodeError> {
        let info = probe::probe(&self.config.ffprobe_path, &self.source_url).await?;
        info!(
            identifier = %self.identifier,
            container = %info.container,
            duration_secs = info.duration_secs,
            video_codec = info.video_codec.as_deref().unwrap_or("none"),
            audio_codec = info.audio_codec.as_deref().unwrap_or("none"),
            "probed upstream"
        );

        let manifest =
            playlist::vod_manifest(info.duration_secs, &self.identifier, self.config.segment_secs);
        tokio::fs::create_dir_all(&self.config.transcode_dir).await?;
        tokio::fs::write(self.config.master_playlist_path(&self.identifier), &manifest).await?;

        let start_segment = { self.state.lock().await.seek_start_segment };
        let child =
            driver::spawn_transcoder(&self.config, &self.identifier, &self.source_url, start_segment)
                .await?;

        if self.finished.load(Ordering::SeqCst) {
            // Torn down while we were spawning; don't leave an orphan child.
            let mut child = child;
            let _ = child.start_kill();
            return Err(TranscodeError::FfmpegFailed("stream already torn down".into()));
        }

        let mut state = self.state.lock().await;
        state.transcoder = Some(child);
        state.last_activity = Instant::now();
        state.ticker = Some(self.spawn_ticker());
        Ok(manifest)
    }

    /// Record segment-request activity.
    pub async fn touch(&self) {
        self.state.lock().await.last_activity = Instant::now();
    }

    pub async fn has_live_transcoder(&self) -> bool {
        self.state.lock().await.transcoder.is_some()
    }

    /// Idempotent teardown: stop the ticker, kill the child, optionally sweep
    /// `<identifier>*` artifacts, and drop the registry entry exactly once.
    pub async fn kill(&self, remove_files: bool) {
        {
            let mut state = self.state.lock().await;
            if let Some(ticker) = state.ticker.take() {
                ticker.abort();
            }
            if let Some(mut child) = state.transcoder.take() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
        if remove_files {
            self.remove_artifacts().await;
        }
        self.finish().await;
    }

    /// Remove every `<identifier>*` file under the transcode dir. Best effort;
    /// failures are logged and the sweep continues.
    async fn remove_artifacts(&self) {
        let mut entries = match tokio::fs::read_dir(&self.config.transcode_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(identifier = %self.identifier, error = %e, "cleanup sweep could not read dir");
                return;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&self.identifier) {
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    warn!(identifier = %self.identifier, file = %name, error = %e, "failed to remove artifact");
                }
            }
        }
    }

    /// Runs at most once per stream instance; removes the registry entry.
    async fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.forget(&self.identifier).await;
        }
    }

    fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let stream = Arc::downgrade(self);
        let timeout = Duration::from_secs(self.config.self_destruct_secs);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(TICK_PERIOD).await;
                let Some(stream) = stream.upgrade() else {
                    return;
                };
                if !stream.supervise(timeout).await {
                    return;
                }
            }
        })
    }

    /// One self-destruct tick: reap the child, then enforce the inactivity
    /// limit. Returns whether the ticker should keep running.
    async fn supervise(self: &Arc<Self>, timeout: Duration) -> bool {
        let mut state = self.state.lock().await;

        match state.transcoder.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(Some(status)) if status.success() => {
                    state.transcoder = None;
                    state.ticker.take();
                    drop(state);
                    info!(identifier = %self.identifier, "transcoder reached end of stream");
                    self.kill(false).await;
                    return false;
                }
                Ok(Some(status)) => {
                    // Leave the stream registered: the next segment request
                    // detects the missing transcoder and respawns it.
                    state.transcoder = None;
                    state.ticker.take();
                    warn!(identifier = %self.identifier, ?status, "transcoder exited with error");
                    return false;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(identifier = %self.identifier, error = %e, "could not poll transcoder");
                }
            },
            None => {
                state.ticker.take();
                return false;
            }
        }

        if state.last_activity.elapsed() > timeout {
            state.ticker.take();
            drop(state);
            info!(identifier = %self.identifier, "self-destructing idle stream");
            self.kill(true).await;
            return false;
        }

        true
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Some(ref mut child) = self.state.get_mut().transcoder {
            // Best-effort kill on drop
            let _ = child.start_kill();
        }
    }
}

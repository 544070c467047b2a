//! Registry of live streams.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::stream::Stream;
use crate::{TranscodeError, TranscoderConfig, IDENTIFIER_LEN};

/// All live streams keyed by identifier. The only shared mutable structure
/// in the system; lock hold times are insert/remove/lookup only.
pub struct StreamRegistry {
    config: TranscoderConfig,
    streams: Mutex<HashMap<String, Arc<Stream>>>,
}

impl StreamRegistry {
    pub fn new(config: TranscoderConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            streams: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    /// Admit a new upstream session and run the spawn protocol. Capacity is
    /// checked before anything touches the upstream, so a full registry
    /// rejects without probing. Returns the stream and its synthesized
    /// manifest; on spawn failure the stream is removed again and its
    /// artifacts swept.
    pub async fn open(
        self: &Arc<Self>,
        source_url: &str,
    ) -> Result<(Arc<Stream>, String), TranscodeError> {
        let stream = {
            let mut streams = self.streams.lock().await;
            if streams.len() >= self.config.max_concurrent {
                return Err(TranscodeError::MaxStreamsReached(self.config.max_concurrent));
            }
            let identifier = loop {
                let candidate = new_identifier();
                if !streams.contains_key(&candidate) {
                    break candidate;
                }
            };
            let stream = Stream::new(
                identifier.clone(),
                source_url.to_string(),
                self.config.clone(),
                Arc::downgrade(self),
            );
            streams.insert(identifier, stream.clone());
            info!(
                identifier = %stream.identifier,
                url = %source_url,
                active = streams.len(),
                "stream admitted"
            );
            stream
        };

        match stream.start().await {
            Ok(manifest) => Ok((stream, manifest)),
            Err(e) => {
                stream.kill(true).await;
                Err(e)
            }
        }
    }

    pub async fn get(&self, identifier: &str) -> Option<Arc<Stream>> {
        self.streams.lock().await.get(identifier).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.streams.lock().await.len()
    }

    /// Drop a stream entry; reached exactly once per stream via teardown.
    pub(crate) async fn forget(&self, identifier: &str) {
        let mut streams = self.streams.lock().await;
        if streams.remove(identifier).is_some() {
            info!(identifier, active = streams.len(), "stream closed");
        }
    }

    #[cfg(test)]
    pub(crate) async fn insert_for_test(
        self: &Arc<Self>,
        identifier: &str,
        source_url: &str,
    ) -> Arc<Stream> {
        let stream = Stream::new(
            identifier.to_string(),
            source_url.to_string(),
            self.config.clone(),
            Arc::downgrade(self),
        );
        self.streams
            .lock()
            .await
            .insert(identifier.to_string(), stream.clone());
        stream
    }
}

/// Short filename-safe identifier, unique among live streams (the caller
/// retries on the rare collision).
fn new_identifier() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    hex[..IDENTIFIER_LEN].to_string()
}

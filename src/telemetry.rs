//! Telemetry sampler: last observed value per channel path
//!
//! Channels are created lazily on their first sample and live for the rest of the process.
//! Only the latest value is kept. A channel that was never observed reads as `0.0`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Latest sample of a telemetry channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSample {
    pub value: f32,
    pub updated_at: DateTime<Utc>,
}

/// Shared map of channel path → latest sample; cloning shares the same map
#[derive(Debug, Clone, Default)]
pub struct TelemetrySampler {
    channels: Arc<RwLock<HashMap<String, ChannelSample>>>,
}

impl TelemetrySampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, path: &str, value: f32) {
        let sample = ChannelSample {
            value,
            updated_at: Utc::now(),
        };
        self.channels.write().await.insert(path.to_string(), sample);
    }

    /// Latest value of `path`, `0.0` if never observed
    pub async fn value(&self, path: &str) -> f32 {
        self.channels
            .read()
            .await
            .get(path)
            .map(|sample| sample.value)
            .unwrap_or(0.0)
    }

    pub async fn sample(&self, path: &str) -> Option<ChannelSample> {
        self.channels.read().await.get(path).copied()
    }

    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.read().await.is_empty()
    }
}

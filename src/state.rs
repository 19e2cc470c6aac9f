//! Shared state context
//!
//! Built once by the service and handed to every component as an `Arc<SharedState>`. Each
//! structure inside guards itself, so holders only ever lock one thing at a time.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::trace;

use crate::actors::messages::ShockEvent;
use crate::config::Config;
use crate::cooldown::CooldownLedger;
use crate::openshock::RemoteEvent;
use crate::osc::OscSink;
use crate::telemetry::TelemetrySampler;

/// Capacity of the shock and remote event broadcast channels
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct SharedState {
    config: watch::Receiver<Config>,
    pub telemetry: TelemetrySampler,
    pub cooldowns: CooldownLedger,
    pub sink: Arc<dyn OscSink>,

    /// Shocks issued by this process (dispatcher and trigger engine)
    pub shock_events: broadcast::Sender<ShockEvent>,

    /// Shocks performed by others, relayed by the hub listener
    pub remote_events: broadcast::Sender<RemoteEvent>,
}

impl SharedState {
    pub fn new(sink: Arc<dyn OscSink>, config: watch::Receiver<Config>) -> Self {
        let (shock_events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (remote_events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            cooldowns: CooldownLedger::new(sink.clone(), config.clone()),
            telemetry: TelemetrySampler::new(),
            config,
            sink,
            shock_events,
            remote_events,
        }
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> Config {
        self.config.borrow().clone()
    }

    /// A receiver that is notified on every reconfiguration
    pub fn watch_config(&self) -> watch::Receiver<Config> {
        self.config.clone()
    }

    pub fn publish_shock(&self, event: ShockEvent) {
        match self.shock_events.send(event) {
            Ok(receivers) => trace!("published shock event to {receivers} receivers"),
            Err(_) => trace!("no receivers for shock event"),
        }
    }

    pub fn publish_remote(&self, event: RemoteEvent) {
        match self.remote_events.send(event) {
            Ok(receivers) => trace!("published remote event to {receivers} receivers"),
            Err(_) => trace!("no receivers for remote event"),
        }
    }
}

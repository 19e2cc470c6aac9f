//! Service wiring
//!
//! Builds the shared state once, spawns every actor against it and owns the configuration
//! sender. Reconfiguration is a single `watch` send; each component picks it up on its next
//! unit of work.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::actors::display::DisplayHandle;
use crate::actors::hub::HubHandle;
use crate::actors::messages::ConnectionState;
use crate::actors::trigger::TriggerHandle;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::openshock::OpenShockClient;
use crate::osc::router::RouterHandle;
use crate::osc::{OscSink, UdpSink};
use crate::state::SharedState;

const HUB_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ShockOscService {
    config_tx: watch::Sender<Config>,
    state: Arc<SharedState>,
    dispatcher: Dispatcher,
    router: RouterHandle,
    trigger: TriggerHandle,
    display: DisplayHandle,
    hub: HubHandle,
}

impl ShockOscService {
    /// Start with a UDP sink sending to `config.osc.target`
    pub async fn start(config: Config) -> Result<Self> {
        let target = config.osc.target;
        let sink = UdpSink::bind(target)
            .await
            .with_context(|| format!("failed to open socket for {target}"))?;
        debug!("sending local protocol to {}", sink.target());
        Self::start_with_sink(config, Arc::new(sink)).await
    }

    pub async fn start_with_sink(config: Config, sink: Arc<dyn OscSink>) -> Result<Self> {
        let listen = config.osc.listen;
        let (config_tx, config_rx) = watch::channel(config);

        let state = Arc::new(SharedState::new(sink, config_rx));
        let client = OpenShockClient::new()?;
        let dispatcher = Dispatcher::new(state.clone(), client.clone());

        let router = RouterHandle::bind(listen, dispatcher.clone())
            .await
            .with_context(|| format!("failed to listen on {listen}"))?;
        let trigger = TriggerHandle::spawn(dispatcher.clone());
        let display = DisplayHandle::spawn(state.clone());
        let hub = HubHandle::spawn(state.clone(), client);

        let config = state.config();
        info!(
            "service started: {} group(s), {} shocker(s), remote {}",
            config.shock.groups.len(),
            config.openshock.shockers.len(),
            if config.openshock.remote_enabled() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            config_tx,
            state,
            dispatcher,
            router,
            trigger,
            display,
            hub,
        })
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn router(&self) -> &RouterHandle {
        &self.router
    }

    pub fn trigger(&self) -> &TriggerHandle {
        &self.trigger
    }

    pub fn display(&self) -> &DisplayHandle {
        &self.display
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Replace the configuration for every component
    pub fn update_config(&self, config: Config) {
        debug!("applying new configuration");
        self.config_tx.send_replace(config);
        self.display.request_update();
    }

    /// Best-effort teardown: stop actors, zero pending outputs, cancel timers, close the hub
    pub async fn shutdown(self) {
        info!("shutting down");

        if let Err(e) = self.hub.shutdown().await {
            warn!("hub listener: {e:#}");
        }
        if let Err(e) = self.trigger.shutdown().await {
            warn!("trigger engine: {e:#}");
        }
        if let Err(e) = self.router.shutdown().await {
            warn!("bus router: {e:#}");
        }
        if let Err(e) = self.display.shutdown().await {
            warn!("display: {e:#}");
        }

        self.dispatcher.shutdown().await;
        let cancelled = self.state.cooldowns.cancel_timers().await;
        debug!("cancelled {} cooldown timer(s)", cancelled.len());

        match tokio::time::timeout(
            HUB_CLOSE_TIMEOUT,
            self.hub.wait_for(ConnectionState::Disconnected),
        )
        .await
        {
            Ok(Ok(())) => debug!("hub connection closed"),
            Ok(Err(e)) => debug!("hub listener already gone: {e:#}"),
            Err(_) => warn!("hub connection did not close within {HUB_CLOSE_TIMEOUT:?}"),
        }
    }
}

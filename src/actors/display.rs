//! DisplayActor - rate-limited status line
//!
//! ## State Machine
//!
//! ```text
//! IDLE ──request──► PENDING ──tick, interval elapsed──► SENDING ──sent──► IDLE
//!                    ▲    │
//!                    └────┘ more requests coalesce into the one pending update
//! ```
//!
//! Requests only set a dirty flag, so a burst of shocks produces one update showing the
//! latest state. At most one update goes out per `rate_limit`, and a pending update is sent
//! on the first tick after the interval has passed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveTime};
use rosc::OscType;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, interval};
use tracing::{debug, instrument, trace, warn};

use crate::config::Config;
use crate::openshock::RemoteEvent;
use crate::state::SharedState;
use crate::util::duration_from_secs;

use super::messages::{DisplayCommand, DisplayPhase, ShockEvent};

const MIN_TICK: Duration = Duration::from_millis(10);

/// Compose the status text, one line per category in fixed order: time, last local shock,
/// last remote shock
pub fn compose_status(
    config: &Config,
    time: NaiveTime,
    last_shock: Option<&ShockEvent>,
    last_remote: Option<&RemoteEvent>,
) -> String {
    let mut lines = Vec::new();

    if config.display.show_time {
        lines.push(time.format("%I:%M %p").to_string());
    }

    if config.shock.show_shock_info {
        if let Some(shock) = last_shock {
            lines.push(format!(
                "⚡ {}% {} {:.1}s",
                shock.intensity, shock.group, shock.duration
            ));
        }
    }

    if let Some(remote) = last_remote {
        let user = if remote.is_guest {
            format!("{} (guest)", remote.user_name)
        } else {
            remote.user_name.clone()
        };
        lines.push(format!(
            "{user} ⚡ {} {}% {:.1}s",
            remote.target,
            remote.intensity,
            f64::from(remote.duration_ms) / 1000.0
        ));
    }

    lines.join("\n")
}

pub struct DisplayActor {
    state: Arc<SharedState>,
    phase: DisplayPhase,
    last_sent: Option<Instant>,
    last_shock: Option<ShockEvent>,
    last_remote: Option<RemoteEvent>,
    shock_rx: broadcast::Receiver<ShockEvent>,
    remote_rx: broadcast::Receiver<RemoteEvent>,
    command_rx: mpsc::Receiver<DisplayCommand>,
}

impl DisplayActor {
    pub fn new(state: Arc<SharedState>, command_rx: mpsc::Receiver<DisplayCommand>) -> Self {
        Self {
            shock_rx: state.shock_events.subscribe(),
            remote_rx: state.remote_events.subscribe(),
            state,
            // the initial status goes out on the first tick
            phase: DisplayPhase::Pending,
            last_sent: None,
            last_shock: None,
            last_remote: None,
            command_rx,
        }
    }

    fn request(&mut self) {
        if self.phase == DisplayPhase::Idle {
            trace!("display update pending");
        }
        self.phase = DisplayPhase::Pending;
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting display actor");

        let tick = duration_from_secs(self.state.config().display.tick).max(MIN_TICK);
        let mut ticker = interval(tick);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick().await,

                event = self.shock_rx.recv() => match event {
                    Ok(event) => {
                        self.last_shock = Some(event);
                        self.request();
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("display lagged {skipped} shock event(s)");
                        self.request();
                    }
                    Err(RecvError::Closed) => break,
                },

                event = self.remote_rx.recv() => match event {
                    Ok(event) => {
                        self.last_remote = Some(event);
                        self.request();
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("display lagged {skipped} remote event(s)");
                        self.request();
                    }
                    Err(RecvError::Closed) => break,
                },

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        DisplayCommand::Refresh => self.request(),

                        DisplayCommand::GetPhase { respond_to } => {
                            let _ = respond_to.send(self.phase);
                        }

                        DisplayCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("display actor stopped");
    }

    async fn on_tick(&mut self) {
        if self.phase != DisplayPhase::Pending {
            return;
        }

        let config = self.state.config();
        if !config.display.enabled {
            self.phase = DisplayPhase::Idle;
            return;
        }

        let rate_limit = duration_from_secs(config.display.rate_limit);
        if self.last_sent.is_some_and(|last| last.elapsed() < rate_limit) {
            return;
        }

        self.phase = DisplayPhase::Sending;

        let text = compose_status(
            &config,
            Local::now().time(),
            self.last_shock.as_ref(),
            self.last_remote.as_ref(),
        );
        let args = vec![
            OscType::String(text.clone()),
            OscType::Bool(true),
            OscType::Bool(config.display.notify),
        ];

        match self.state.sink.send(&config.display.address, args).await {
            Ok(()) => debug!("display updated:\n{text}"),
            Err(e) => warn!("failed to send display update: {e}"),
        }

        self.last_sent = Some(Instant::now());
        self.phase = DisplayPhase::Idle;
    }
}

/// Handle for controlling a DisplayActor
#[derive(Clone)]
pub struct DisplayHandle {
    sender: mpsc::Sender<DisplayCommand>,
}

impl DisplayHandle {
    pub fn spawn(state: Arc<SharedState>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let actor = DisplayActor::new(state, cmd_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Request an update; never waits, a full queue already holds a pending refresh
    pub fn request_update(&self) {
        if let Err(mpsc::error::TrySendError::Closed(_)) =
            self.sender.try_send(DisplayCommand::Refresh)
        {
            debug!("display actor is gone, dropping refresh");
        }
    }

    pub async fn phase(&self) -> Result<DisplayPhase> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DisplayCommand::GetPhase { respond_to: tx })
            .await
            .context("failed to send GetPhase command")?;

        rx.await.context("failed to receive display phase")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(DisplayCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

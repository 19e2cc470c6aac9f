//! HubListenerActor - streaming connection to the remote service
//!
//! One task owns the connection from negotiation to teardown, so reconfiguration can never
//! race an in-flight connect.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! Disconnected ─► Negotiating ─► Connecting ─► Connected ─► Closing ─► Disconnected
//!       ▲              │              │            │
//!       └──────────────┴──── failure / dropped ────┘
//! ```
//!
//! A changed endpoint (token, API or hub URL) tears the connection down and starts a fresh
//! one. A dropped connection stays `Disconnected` until the endpoint changes again or a
//! [`HubCommand::Reconnect`] arrives; there is no automatic retry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{Config, OpenShockConfig};
use crate::error::{ShockError, ShockResult};
use crate::openshock::protocol::{
    HubMessage, LOG_TARGET, handshake_frame, parse_message, ping_frame, shock_events, split_frames,
};
use crate::openshock::{OpenShockClient, TOKEN_HEADER};
use crate::state::SharedState;
use crate::util::mask_token;

use super::messages::{ConnectionState, HubCommand};

/// Client keep-alive ping period
pub const PING_INTERVAL: Duration = Duration::from_secs(15);

/// The parts of the configuration that identify the hub connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub token: Option<String>,
    pub api_url: String,
    pub hub_url: Option<String>,
}

impl Endpoint {
    pub fn from_config(config: &Config) -> Self {
        let api = &config.openshock;
        Self {
            token: api.credential().map(str::to_string),
            api_url: api.api_url.clone(),
            hub_url: api.hub_url.clone(),
        }
    }

    fn api(&self) -> OpenShockConfig {
        OpenShockConfig {
            token: self.token.clone(),
            api_url: self.api_url.clone(),
            hub_url: self.hub_url.clone(),
            ..OpenShockConfig::default()
        }
    }
}

/// WebSocket URL of the user hub for a negotiated connection
pub fn hub_url(endpoint: &Endpoint, connection_token: &str, token: &str) -> ShockResult<Url> {
    let base = endpoint.hub_url.as_deref().unwrap_or(&endpoint.api_url);
    let mut url =
        Url::parse(base).map_err(|e| ShockError::Stream(format!("invalid hub URL {base}: {e}")))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| ShockError::Stream(format!("cannot use {base} as a hub URL")))?;

    let path = format!("{}/1/hubs/user", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("id", connection_token)
        .append_pair("access_token", token);

    Ok(url)
}

fn connect_request(url: &Url, token: &str) -> ShockResult<Request> {
    let mut request = url.as_str().into_client_request()?;
    let name = HeaderName::from_bytes(TOKEN_HEADER.as_bytes())
        .map_err(|e| ShockError::Stream(e.to_string()))?;
    let value = HeaderValue::from_str(token).map_err(|e| ShockError::Stream(e.to_string()))?;
    request.headers_mut().insert(name, value);
    Ok(request)
}

/// Why the idle wait or a session was cut short
#[derive(Debug)]
enum Interrupt {
    Reconnect,
    EndpointChanged(Endpoint),
    Shutdown,
}

#[derive(Debug)]
enum SessionEnd {
    /// Connection failed or was closed from the other side
    Dropped(String),
    Interrupted(Interrupt),
}

pub struct HubListenerActor {
    state: Arc<SharedState>,
    client: OpenShockClient,
    status: watch::Sender<ConnectionState>,
    config_rx: watch::Receiver<Config>,
    command_rx: mpsc::Receiver<HubCommand>,
}

impl HubListenerActor {
    pub fn new(
        state: Arc<SharedState>,
        client: OpenShockClient,
        status: watch::Sender<ConnectionState>,
        command_rx: mpsc::Receiver<HubCommand>,
    ) -> Self {
        Self {
            config_rx: state.watch_config(),
            state,
            client,
            status,
            command_rx,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.status.send_replace(state);
        if previous != state {
            debug!("hub connection {previous:?} → {state:?}");
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting hub listener");

        let mut endpoint = Endpoint::from_config(&self.config_rx.borrow_and_update());
        let mut connect = true;

        loop {
            if connect && endpoint.token.is_some() {
                let end = self.session(&endpoint).await;
                self.set_state(ConnectionState::Disconnected);

                match end {
                    SessionEnd::Dropped(reason) => info!("hub connection ended: {reason}"),
                    SessionEnd::Interrupted(Interrupt::Reconnect) => continue,
                    SessionEnd::Interrupted(Interrupt::EndpointChanged(updated)) => {
                        info!("hub endpoint changed, reconnecting");
                        endpoint = updated;
                        continue;
                    }
                    SessionEnd::Interrupted(Interrupt::Shutdown) => break,
                }
            } else if connect {
                debug!("no remote token configured, hub listener idle");
            }

            connect = match self.next_interrupt(&endpoint).await {
                Interrupt::Reconnect => true,
                Interrupt::EndpointChanged(updated) => {
                    endpoint = updated;
                    true
                }
                Interrupt::Shutdown => break,
            };
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("hub listener stopped");
    }

    /// Wait for a command or an endpoint change
    ///
    /// Cancel safe: only channel receives are awaited.
    async fn next_interrupt(&mut self, current: &Endpoint) -> Interrupt {
        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    return match cmd {
                        Some(HubCommand::Reconnect) => {
                            debug!("received reconnect command");
                            Interrupt::Reconnect
                        }
                        Some(HubCommand::Shutdown) | None => Interrupt::Shutdown,
                    };
                }

                changed = self.config_rx.changed() => {
                    if changed.is_err() {
                        return Interrupt::Shutdown;
                    }
                    let updated = Endpoint::from_config(&self.config_rx.borrow_and_update());
                    if updated != *current {
                        return Interrupt::EndpointChanged(updated);
                    }
                }
            }
        }
    }

    async fn session(&mut self, endpoint: &Endpoint) -> SessionEnd {
        let Some(token) = endpoint.token.clone() else {
            return SessionEnd::Dropped("no token".to_string());
        };
        let api = endpoint.api();
        let client = self.client.clone();

        self.set_state(ConnectionState::Negotiating);
        debug!("negotiating with {} using token {}", api.api_url, mask_token(&token));

        let negotiated = tokio::select! {
            result = client.negotiate(&api) => result,
            interrupt = self.next_interrupt(endpoint) => return SessionEnd::Interrupted(interrupt),
        };
        let negotiated = match negotiated {
            Ok(negotiated) => negotiated,
            Err(e) => return SessionEnd::Dropped(format!("negotiate failed: {e}")),
        };
        let Some(connection_token) = negotiated.connection_token().map(str::to_string) else {
            return SessionEnd::Dropped("negotiate returned no connection token".to_string());
        };

        let request = match hub_url(endpoint, &connection_token, &token)
            .and_then(|url| connect_request(&url, &token))
        {
            Ok(request) => request,
            Err(e) => return SessionEnd::Dropped(e.to_string()),
        };

        self.set_state(ConnectionState::Connecting);
        let connected = tokio::select! {
            result = connect_async(request) => result,
            interrupt = self.next_interrupt(endpoint) => return SessionEnd::Interrupted(interrupt),
        };
        let mut ws = match connected {
            Ok((ws, _)) => ws,
            Err(e) => return SessionEnd::Dropped(format!("connect failed: {e}")),
        };

        if let Err(e) = ws.send(Message::Text(handshake_frame())).await {
            return SessionEnd::Dropped(format!("handshake failed: {e}"));
        }

        let mut ping = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);

        loop {
            tokio::select! {
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reason) = self.handle_text(&text) {
                            self.set_state(ConnectionState::Closing);
                            let _ = ws.close(None).await;
                            return SessionEnd::Dropped(reason);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return SessionEnd::Dropped(format!("closed by server: {frame:?}"));
                    }
                    Some(Ok(other)) => trace!("ignoring frame {other:?}"),
                    Some(Err(e)) => return SessionEnd::Dropped(format!("receive failed: {e}")),
                    None => return SessionEnd::Dropped("stream ended".to_string()),
                },

                _ = ping.tick() => {
                    if let Err(e) = ws.send(Message::Text(ping_frame())).await {
                        return SessionEnd::Dropped(format!("ping failed: {e}"));
                    }
                    trace!("sent hub ping");
                }

                interrupt = self.next_interrupt(endpoint) => {
                    self.set_state(ConnectionState::Closing);
                    if let Err(e) = ws.close(None).await {
                        debug!("error closing hub connection: {e}");
                    }
                    return SessionEnd::Interrupted(interrupt);
                }
            }
        }
    }

    /// Handle one transport frame; returns a reason if the hub asked to close
    fn handle_text(&self, text: &str) -> Option<String> {
        for raw in split_frames(text) {
            match parse_message(raw) {
                Ok(HubMessage::HandshakeAck { error: None }) => {
                    info!("connected to hub");
                    self.set_state(ConnectionState::Connected);
                }
                Ok(HubMessage::HandshakeAck { error: Some(error) }) => {
                    return Some(format!("handshake rejected: {error}"));
                }
                Ok(HubMessage::Invocation { target, arguments }) if target == LOG_TARGET => {
                    self.handle_log(&arguments);
                }
                Ok(HubMessage::Invocation { target, .. }) => {
                    debug!("ignoring hub invocation {target}");
                }
                Ok(HubMessage::Ping) => trace!("hub ping"),
                Ok(HubMessage::Close { error }) => {
                    return Some(error.unwrap_or_else(|| "closed by hub".to_string()));
                }
                Ok(HubMessage::Other { kind }) => trace!("ignoring hub message type {kind}"),
                Err(e) => warn!("dropping hub message: {e}"),
            }
        }
        None
    }

    fn handle_log(&self, arguments: &[Value]) {
        let events = match shock_events(arguments) {
            Ok(events) => events,
            Err(e) => {
                warn!("dropping log invocation: {e}");
                return;
            }
        };

        let config = self.state.config();
        for event in events {
            let event = event.resolve_target(&config.openshock);
            info!(
                "remote shock by {}{} on {} at {}% for {}ms",
                event.user_name,
                if event.is_guest { " (guest)" } else { "" },
                event.target,
                event.intensity,
                event.duration_ms
            );
            self.state.publish_remote(event);
        }
    }
}

/// Handle for controlling a HubListenerActor
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
    status: watch::Receiver<ConnectionState>,
}

impl HubHandle {
    pub fn spawn(state: Arc<SharedState>, client: OpenShockClient) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);

        let actor = HubListenerActor::new(state, client, status_tx, cmd_rx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            status: status_rx,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    /// Wait until the connection reaches `state`
    pub async fn wait_for(&self, state: ConnectionState) -> Result<()> {
        let mut status = self.status.clone();
        status
            .wait_for(|current| *current == state)
            .await
            .context("hub listener stopped")?;
        Ok(())
    }

    /// Drop the current connection, if any, and connect again
    pub async fn reconnect(&self) -> Result<()> {
        self.sender
            .send(HubCommand::Reconnect)
            .await
            .context("failed to send Reconnect command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(HubCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

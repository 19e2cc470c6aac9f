//! Inbound bus router
//!
//! Incoming addresses are looked up in a registration table built from the configuration:
//! telemetry channel paths and explicit trigger addresses. Reconfiguration re-syncs the
//! table. Entries are never removed: an address that is no longer configured is marked
//! `Stale` and its messages are dropped at dispatch time. Syncing the same configuration
//! twice changes nothing.
//!
//! ## Message Flow
//!
//! ```text
//! UDP datagram → decode → flatten bundles → spawn per message ─┬─► telemetry sampler
//!                                                              └─► dispatcher (truthy only)
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use rosc::{OscMessage, OscPacket, decoder};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, instrument, trace, warn};

use crate::actors::messages::RouterCommand;
use crate::config::{AddressTrigger, Config, TriggerAction};
use crate::dispatcher::Dispatcher;
use crate::error::ShockResult;
use crate::util::{as_float, is_truthy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Active,
    Stale,
}

/// What a registered address feeds
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// Value is recorded as a telemetry sample
    pub telemetry: bool,

    /// Truthy values run this trigger
    pub trigger: Option<AddressTrigger>,
    pub liveness: Liveness,
}

/// Counts from one [`RouteTable::sync`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub active: usize,
    pub stale: usize,
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<String, Registration>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the table in line with `config`
    pub fn sync(&mut self, config: &Config) -> SyncReport {
        for registration in self.routes.values_mut() {
            registration.telemetry = false;
            registration.trigger = None;
            registration.liveness = Liveness::Stale;
        }

        let mut added = 0;

        for variable in config.slide.variables.iter().filter(|v| v.enabled) {
            activate(&mut self.routes, &variable.path, &mut added).telemetry = true;
        }

        for trigger in config.effective_triggers() {
            let address = trigger.address.clone();
            activate(&mut self.routes, &address, &mut added).trigger = Some(trigger);
        }

        let active = self
            .routes
            .values()
            .filter(|r| r.liveness == Liveness::Active)
            .count();

        SyncReport {
            added,
            active,
            stale: self.routes.len() - active,
        }
    }

    /// Registration for `address` if it is still configured
    pub fn resolve(&self, address: &str) -> Option<&Registration> {
        self.routes
            .get(address)
            .filter(|r| r.liveness == Liveness::Active)
    }

    pub fn registration(&self, address: &str) -> Option<&Registration> {
        self.routes.get(address)
    }

    pub fn snapshot(&self) -> Vec<(String, Registration)> {
        let mut routes: Vec<(String, Registration)> = self
            .routes
            .iter()
            .map(|(address, r)| (address.clone(), r.clone()))
            .collect();
        routes.sort_by(|a, b| a.0.cmp(&b.0));
        routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn activate<'a>(
    routes: &'a mut HashMap<String, Registration>,
    address: &str,
    added: &mut usize,
) -> &'a mut Registration {
    let registration = routes.entry(address.to_string()).or_insert_with(|| {
        *added += 1;
        Registration {
            telemetry: false,
            trigger: None,
            liveness: Liveness::Stale,
        }
    });
    registration.liveness = Liveness::Active;
    registration
}

/// Flatten a packet into its messages, descending into bundles
pub fn flatten_packet(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(message) => out.push(message),
        OscPacket::Bundle(bundle) => {
            for packet in bundle.content {
                flatten_packet(packet, out);
            }
        }
    }
}

/// Run the trigger bound to an address
pub async fn run_trigger(dispatcher: &Dispatcher, trigger: &AddressTrigger) {
    let groups = trigger.groups.as_deref();

    match trigger.action {
        TriggerAction::Shock => {
            let outcome = dispatcher.send_timed(groups, None, None).await;
            debug!("{} → {outcome:?}", trigger.address);
        }
        TriggerAction::ImmediateShock => {
            let outcome = dispatcher.send_immediate(groups).await;
            debug!("{} → {outcome:?}", trigger.address);
        }
        TriggerAction::Vibrate => {
            let outcome = dispatcher.send_vibrate(groups).await;
            debug!("{} → {outcome:?}", trigger.address);
        }
        TriggerAction::Stop => {
            dispatcher.stop(groups).await;
        }
        TriggerAction::StopVibrate => {
            dispatcher.stop_vibrate(groups).await;
        }
        TriggerAction::ClearCooldowns => match groups {
            Some(groups) => {
                for group in groups {
                    dispatcher.clear_cooldown(group).await;
                }
            }
            None => {
                dispatcher.clear_all_cooldowns().await;
            }
        },
    }
}

async fn handle_message(
    table: Arc<RwLock<RouteTable>>,
    dispatcher: Dispatcher,
    message: OscMessage,
) {
    let registration = table
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .resolve(&message.addr)
        .cloned();

    let Some(registration) = registration else {
        trace!("no active route for {}", message.addr);
        return;
    };

    let arg = message.args.first();

    if registration.telemetry {
        let value = arg.and_then(as_float).unwrap_or(0.0);
        dispatcher
            .state()
            .telemetry
            .record(&message.addr, value)
            .await;
        trace!("{} = {value}", message.addr);
    }

    if let Some(trigger) = registration.trigger {
        if arg.is_some_and(is_truthy) {
            info!("trigger {} ({:?})", trigger.address, trigger.action);
            run_trigger(&dispatcher, &trigger).await;
        } else {
            trace!("ignoring falsy value on {}", message.addr);
        }
    }
}

struct OscRouter {
    socket: UdpSocket,
    table: Arc<RwLock<RouteTable>>,
    dispatcher: Dispatcher,
    config: watch::Receiver<Config>,
    command_rx: mpsc::Receiver<RouterCommand>,
}

impl OscRouter {
    fn resync(&self) {
        let config = self.config.borrow().clone();
        let report = self
            .table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .sync(&config);
        debug!(
            "routes synced: {} added, {} active, {} stale",
            report.added, report.active, report.stale
        );
    }

    fn handle_datagram(&self, bytes: &[u8], from: SocketAddr) {
        let packet = match decoder::decode_udp(bytes) {
            Ok((_, packet)) => packet,
            Err(e) => {
                warn!("dropping undecodable datagram from {from}: {e:?}");
                return;
            }
        };

        let mut messages = Vec::new();
        flatten_packet(packet, &mut messages);

        for message in messages {
            tokio::spawn(handle_message(
                Arc::clone(&self.table),
                self.dispatcher.clone(),
                message,
            ));
        }
    }

    #[instrument(skip(self), fields(listen = ?self.socket.local_addr().ok()))]
    async fn run(mut self) {
        debug!("starting bus router");
        self.resync();

        let mut buf = vec![0u8; decoder::MTU];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => self.handle_datagram(&buf[..len], from),
                        Err(e) => warn!("failed to receive datagram: {e}"),
                    }
                }

                changed = self.config.changed() => {
                    if changed.is_err() {
                        debug!("config channel closed, shutting down");
                        break;
                    }
                    self.resync();
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        RouterCommand::GetRoutes { respond_to } => {
                            let routes = self
                                .table
                                .read()
                                .unwrap_or_else(PoisonError::into_inner)
                                .snapshot();
                            let _ = respond_to.send(routes);
                        }

                        RouterCommand::Shutdown => {
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

        debug!("bus router stopped");
    }
}

#[derive(Clone)]
pub struct RouterHandle {
    sender: mpsc::Sender<RouterCommand>,
    local_addr: SocketAddr,
}

impl RouterHandle {
    /// Bind the listen socket and spawn the router
    pub async fn bind(listen: SocketAddr, dispatcher: Dispatcher) -> ShockResult<Self> {
        let socket = UdpSocket::bind(listen).await?;
        Self::spawn(socket, dispatcher)
    }

    pub fn spawn(socket: UdpSocket, dispatcher: Dispatcher) -> ShockResult<Self> {
        let local_addr = socket.local_addr()?;
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let router = OscRouter {
            socket,
            table: Arc::new(RwLock::new(RouteTable::new())),
            config: dispatcher.state().watch_config(),
            dispatcher,
            command_rx: cmd_rx,
        };

        tokio::spawn(router.run());
        info!("listening for bus messages on {local_addr}");

        Ok(Self {
            sender: cmd_tx,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current registration table, sorted by address
    pub async fn routes(&self) -> Result<Vec<(String, Registration)>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RouterCommand::GetRoutes { respond_to: tx })
            .await
            .context("failed to send GetRoutes command")?;
        rx.await.context("failed to receive routes")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(RouterCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

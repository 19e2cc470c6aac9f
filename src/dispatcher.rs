//! Actuation dispatcher
//!
//! Resolves target groups, picks a transport and arms cooldown.
//!
//! ## Transport selection
//!
//! ```text
//! groups ─► drop COOLING ─► shockers mapped? ─yes─► remote control API ─ok─► done
//!                                │                          │
//!                                no                       failed
//!                                └────────► local wire protocol ◄┘
//! ```
//!
//! Remote failures never reach the caller: they are logged and the same command goes out on
//! the local protocol. Locally, a continuous parameter is set and a stop timer keyed by group
//! resets it after `duration`; a new trigger for the group replaces the pending stop.
//!
//! Shocks consult and arm cooldown. Vibrations never do. Ready groups are claimed in the
//! cooldown ledger before delivery starts, so concurrent triggers for the same group cannot
//! both get through while a remote call is in flight.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rosc::OscType;
use tracing::{debug, info, instrument, trace, warn};

use crate::actors::messages::{ShockEvent, ShockSource};
use crate::config::{Config, IntensityMode};
use crate::error::ShockError;
use crate::openshock::OpenShockClient;
use crate::osc::{Parameter, parameter_address};
use crate::state::SharedState;
use crate::timers::TimerSet;
use crate::util::{clamp_intensity, duration_from_secs};
use crate::{ActionKind, ActuationCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Remote,
    Local,
}

/// Result of a dispatch request
///
/// Configuration problems (disabled, nothing to target, no credential) are `Skipped`; they
/// are expected and only logged.
#[derive(Debug)]
pub enum DispatchOutcome {
    Skipped(ShockError),
    Sent {
        transport: Transport,
        groups: Vec<String>,
        intensity: u8,
    },
    /// The remote-only path failed; there is no local fallback for direct shocker triggers
    Failed(ShockError),
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchOutcome::Sent { .. })
    }

    pub fn transport(&self) -> Option<Transport> {
        match self {
            DispatchOutcome::Sent { transport, .. } => Some(*transport),
            _ => None,
        }
    }
}

/// Intensity for a group-level actuation according to the configured mode
pub fn choose_intensity<R: Rng + ?Sized>(mode: &IntensityMode, rng: &mut R) -> i32 {
    match *mode {
        IntensityMode::Static { intensity } => intensity,
        IntensityMode::Random { min, max } if min < max => rng.gen_range(min..=max),
        IntensityMode::Random { min, .. } => min,
    }
}

fn requested_groups(config: &Config, groups: Option<&[String]>) -> Vec<String> {
    match groups {
        Some(groups) => groups.to_vec(),
        None => config.shock.groups.clone(),
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<SharedState>,
    client: OpenShockClient,
    shock_stops: TimerSet<String>,
    vibrate_stops: TimerSet<String>,
}

impl Dispatcher {
    pub fn new(state: Arc<SharedState>, client: OpenShockClient) -> Self {
        Self {
            state,
            client,
            shock_stops: TimerSet::new(),
            vibrate_stops: TimerSet::new(),
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn client(&self) -> &OpenShockClient {
        &self.client
    }

    /// Shock `groups` (default: configured groups) for `duration` seconds
    pub async fn send_timed(
        &self,
        groups: Option<&[String]>,
        intensity: Option<i32>,
        duration: Option<f64>,
    ) -> DispatchOutcome {
        self.send_shock(groups, intensity, duration, Parameter::ContinuousShock)
            .await
    }

    /// Shock `groups` using the momentary parameter on the local protocol
    pub async fn send_immediate(&self, groups: Option<&[String]>) -> DispatchOutcome {
        self.send_shock(groups, None, None, Parameter::ImmediateShock)
            .await
    }

    #[instrument(skip(self, groups, intensity, duration))]
    async fn send_shock(
        &self,
        groups: Option<&[String]>,
        intensity: Option<i32>,
        duration: Option<f64>,
        parameter: Parameter,
    ) -> DispatchOutcome {
        let config = self.state.config();
        if !config.shock.enabled {
            info!("actuation disabled, ignoring shock");
            return DispatchOutcome::Skipped(ShockError::Disabled);
        }

        let (ready, cooling): (Vec<String>, Vec<String>) = requested_groups(&config, groups)
            .into_iter()
            .partition(|group| self.state.cooldowns.try_reserve(group));

        if ready.is_empty() {
            info!("no group ready to shock, cooling: {cooling:?}");
            return DispatchOutcome::Skipped(ShockError::NoTargets);
        }
        if !cooling.is_empty() {
            debug!("skipping groups on cooldown: {cooling:?}");
        }

        let intensity = clamp_intensity(intensity.unwrap_or_else(|| {
            choose_intensity(&config.shock.intensity, &mut rand::thread_rng())
        }));
        let duration = duration.unwrap_or(config.shock.duration);

        info!("shocking {ready:?} at {intensity}% for {duration}s");
        let transport = self
            .deliver(&config, &ready, ActionKind::Shock, intensity, duration, parameter)
            .await;

        for group in &ready {
            self.state.cooldowns.arm(group).await;
            self.state.publish_shock(ShockEvent {
                group: group.clone(),
                intensity,
                duration,
                source: ShockSource::Dispatch,
                timestamp: Utc::now(),
            });
        }

        DispatchOutcome::Sent {
            transport,
            groups: ready,
            intensity,
        }
    }

    /// Vibrate `groups`; cooldown is neither consulted nor armed
    #[instrument(skip_all)]
    pub async fn send_vibrate(&self, groups: Option<&[String]>) -> DispatchOutcome {
        let config = self.state.config();
        if !config.shock.enabled {
            info!("actuation disabled, ignoring vibrate");
            return DispatchOutcome::Skipped(ShockError::Disabled);
        }

        let groups = requested_groups(&config, groups);
        if groups.is_empty() {
            info!("no group to vibrate");
            return DispatchOutcome::Skipped(ShockError::NoTargets);
        }

        let intensity = clamp_intensity(choose_intensity(
            &config.shock.intensity,
            &mut rand::thread_rng(),
        ));
        let duration = config.shock.duration;

        info!("vibrating {groups:?} at {intensity}% for {duration}s");
        let transport = self
            .deliver(
                &config,
                &groups,
                ActionKind::Vibrate,
                intensity,
                duration,
                Parameter::ContinuousVibrate,
            )
            .await;

        DispatchOutcome::Sent {
            transport,
            groups,
            intensity,
        }
    }

    /// Zero the shock parameter of `groups` now and cancel their pending stops
    ///
    /// When the remote API is configured a stop is sent to the mapped shockers too; its
    /// failure is only logged.
    #[instrument(skip_all)]
    pub async fn stop(&self, groups: Option<&[String]>) -> Vec<String> {
        let config = self.state.config();
        let groups = requested_groups(&config, groups);
        let prefix = &config.osc.parameter_prefix;

        for group in &groups {
            self.shock_stops.cancel(group);
            let address = parameter_address(prefix, group, Parameter::ContinuousShock);
            self.emit(&address, OscType::Float(0.0)).await;
            info!("stopped shock for {group}");
        }

        let api = &config.openshock;
        let shocker_ids = api.shockers_in_groups(&groups);
        if api.remote_enabled() && !shocker_ids.is_empty() {
            let command = ActuationCommand::new(shocker_ids, 0, 0.0, ActionKind::Stop);
            if let Err(e) = self.client.control(api, &command).await {
                warn!("remote stop failed: {e}");
            }
        }

        groups
    }

    /// Zero the vibrate parameter of `groups` and cancel their pending stops
    pub async fn stop_vibrate(&self, groups: Option<&[String]>) -> Vec<String> {
        let config = self.state.config();
        let groups = requested_groups(&config, groups);

        for group in &groups {
            self.vibrate_stops.cancel(group);
            let address = parameter_address(
                &config.osc.parameter_prefix,
                group,
                Parameter::ContinuousVibrate,
            );
            self.emit(&address, OscType::Float(0.0)).await;
        }
        info!("stopped vibration for {groups:?}");

        groups
    }

    /// Shock concrete shockers over the remote API, bypassing group dispatch
    ///
    /// `shocker_ids` empty means every mapped shocker. Shockers whose group is cooling, or
    /// that have no group, are left out. Once the call is attempted, cooldown is armed and a
    /// shock event is published for every affected group, whether or not it succeeded.
    #[instrument(skip(self, shocker_ids))]
    pub async fn trigger_shockers(
        &self,
        shocker_ids: &[String],
        intensity: i32,
        source: ShockSource,
    ) -> DispatchOutcome {
        let config = self.state.config();
        if !config.shock.enabled {
            debug!("actuation disabled, ignoring trigger");
            return DispatchOutcome::Skipped(ShockError::Disabled);
        }

        let api = &config.openshock;
        let candidates: Vec<String> = if shocker_ids.is_empty() {
            api.shockers.keys().cloned().collect()
        } else {
            shocker_ids.to_vec()
        };

        if candidates.is_empty() {
            info!("trigger skipped, no shockers configured");
            return DispatchOutcome::Skipped(ShockError::NoTargets);
        }

        let mut available = Vec::new();
        let mut groups: Vec<String> = Vec::new();
        for id in candidates {
            let Some(group) = api.group_of(&id) else {
                debug!("shocker {id} has no group assignment");
                continue;
            };

            if groups.iter().any(|g| g == group) {
                available.push(id);
            } else if self.state.cooldowns.try_reserve(group) {
                groups.push(group.to_string());
                available.push(id);
            } else {
                trace!("shocker {id} skipped, {group} is cooling");
            }
        }

        if available.is_empty() {
            info!("trigger skipped, every selected shocker is cooling");
            return DispatchOutcome::Skipped(ShockError::NoTargets);
        }

        let command = ActuationCommand::new(
            available,
            intensity,
            config.shock.duration,
            ActionKind::Shock,
        );
        let result = match self.client.control(api, &command).await {
            Err(e) if e.is_configuration() => {
                info!("trigger skipped: {e}");
                for group in &groups {
                    self.state.cooldowns.release(group);
                }
                return DispatchOutcome::Skipped(e);
            }
            result => result,
        };

        for group in &groups {
            self.state.cooldowns.arm(group).await;
            self.state.publish_shock(ShockEvent {
                group: group.clone(),
                intensity: command.intensity,
                duration: command.duration,
                source: source.clone(),
                timestamp: Utc::now(),
            });
        }

        match result {
            Ok(()) => {
                info!(
                    "triggered {} shocker(s) in {groups:?} at {}%",
                    command.shocker_ids.len(),
                    command.intensity
                );
                DispatchOutcome::Sent {
                    transport: Transport::Remote,
                    groups,
                    intensity: command.intensity,
                }
            }
            Err(e) => {
                warn!("remote trigger failed: {e}");
                DispatchOutcome::Failed(e)
            }
        }
    }

    pub async fn clear_cooldown(&self, group: &str) {
        self.state.cooldowns.clear(group).await;
    }

    pub async fn clear_all_cooldowns(&self) -> Vec<String> {
        self.state.cooldowns.clear_all().await
    }

    /// Cooldown flag of every configured group
    pub fn cooldown_status(&self) -> BTreeMap<String, bool> {
        self.state.cooldowns.status(&self.state.config().shock.groups)
    }

    /// Cancel pending stops and zero the groups they were holding up
    pub async fn shutdown(&self) {
        let prefix = self.state.config().osc.parameter_prefix;

        for group in self.shock_stops.cancel_all() {
            let address = parameter_address(&prefix, &group, Parameter::ContinuousShock);
            self.emit(&address, OscType::Float(0.0)).await;
        }
        for group in self.vibrate_stops.cancel_all() {
            let address = parameter_address(&prefix, &group, Parameter::ContinuousVibrate);
            self.emit(&address, OscType::Float(0.0)).await;
        }
    }

    async fn deliver(
        &self,
        config: &Config,
        groups: &[String],
        kind: ActionKind,
        intensity: u8,
        duration: f64,
        parameter: Parameter,
    ) -> Transport {
        if self
            .try_remote(config, groups, kind, intensity, duration)
            .await
        {
            return Transport::Remote;
        }

        self.send_local(&config.osc.parameter_prefix, groups, intensity, duration, parameter)
            .await;
        Transport::Local
    }

    async fn try_remote(
        &self,
        config: &Config,
        groups: &[String],
        kind: ActionKind,
        intensity: u8,
        duration: f64,
    ) -> bool {
        let api = &config.openshock;
        if !api.remote_enabled() {
            trace!("remote API not configured");
            return false;
        }

        let shocker_ids = api.shockers_in_groups(groups);
        if shocker_ids.is_empty() {
            debug!("no shockers assigned to {groups:?}");
            return false;
        }

        let command = ActuationCommand::new(shocker_ids, intensity.into(), duration, kind);
        match self.client.control(api, &command).await {
            Ok(()) => {
                debug!("remote {} accepted for {groups:?}", kind.label());
                true
            }
            Err(e) => {
                warn!(
                    "remote {} failed, falling back to local protocol: {e}",
                    kind.label()
                );
                false
            }
        }
    }

    async fn send_local(
        &self,
        prefix: &str,
        groups: &[String],
        intensity: u8,
        duration: f64,
        parameter: Parameter,
    ) {
        let level = f32::from(intensity) / 100.0;

        for group in groups {
            let address = parameter_address(prefix, group, parameter);
            match self.stop_timers(parameter) {
                Some(timers) => {
                    self.emit(&address, OscType::Float(level)).await;
                    self.schedule_stop(timers, address, group, duration);
                }
                None => self.emit(&address, OscType::Bool(true)).await,
            }
        }
    }

    fn stop_timers(&self, parameter: Parameter) -> Option<&TimerSet<String>> {
        match parameter {
            Parameter::ContinuousShock => Some(&self.shock_stops),
            Parameter::ContinuousVibrate => Some(&self.vibrate_stops),
            Parameter::ImmediateShock | Parameter::Cooldown => None,
        }
    }

    fn schedule_stop(
        &self,
        timers: &TimerSet<String>,
        address: String,
        group: &str,
        duration: f64,
    ) {
        let sink = self.state.sink.clone();
        let replaced = timers.schedule(group.to_string(), duration_from_secs(duration), async move {
            match sink.send(&address, vec![OscType::Float(0.0)]).await {
                Ok(()) => debug!("timer stopped {address}"),
                Err(e) => warn!("failed to send scheduled stop {address}: {e}"),
            }
        });

        if replaced {
            debug!("replaced pending stop for {group}");
        }
    }

    async fn emit(&self, address: &str, value: OscType) {
        trace!("sending {address} = {value:?}");
        if let Err(e) = self.state.sink.send(address, vec![value]).await {
            warn!("failed to send {address}: {e}");
        }
    }
}

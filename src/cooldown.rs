//! Cooldown ledger - per-group READY/COOLING lockout
//!
//! ## State Machine
//!
//! ```text
//! READY ──arm()──────────────► COOLING ──deadline elapsed──► READY
//!                                │  ▲                         ▲
//!                                │  └─arm() (timer restarts)  │
//!                                └──────clear()───────────────┘
//! ```
//!
//! Every transition publishes `{group}_Cooldown` on the wire protocol. A cooldown delay
//! `<= 0` disables the ledger: arming is a no-op and every group reads READY.
//!
//! Dispatch claims a group with `try_reserve` before it starts delivering, so a second
//! trigger racing an in-flight remote call already sees COOLING. The claim is settled by
//! `arm` (or dropped by `release`) once delivery is done.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rosc::OscType;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::osc::{OscSink, Parameter, parameter_address};
use crate::timers::TimerSet;
use crate::util::duration_from_secs;

/// Upper bound on how long a reservation holds a group before `arm` or `release` settles it
const RESERVATION_HOLD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    Ready,
    Cooling { until: Instant },
}

/// Shared cooldown ledger; cloning shares state and timers
#[derive(Clone)]
pub struct CooldownLedger {
    deadlines: Arc<Mutex<HashMap<String, Instant>>>,
    timers: TimerSet<String>,
    sink: Arc<dyn OscSink>,
    config: watch::Receiver<Config>,
}

impl CooldownLedger {
    pub fn new(sink: Arc<dyn OscSink>, config: watch::Receiver<Config>) -> Self {
        Self {
            deadlines: Arc::new(Mutex::new(HashMap::new())),
            timers: TimerSet::new(),
            sink,
            config,
        }
    }

    fn deadlines(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.deadlines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delay(&self) -> Option<Duration> {
        let seconds = self.config.borrow().shock.cooldown_delay;
        (seconds > 0.0).then(|| duration_from_secs(seconds))
    }

    /// Put `group` into COOLING for the configured delay, restarting any running cooldown
    ///
    /// Returns `false` when cooldown is disabled.
    pub async fn arm(&self, group: &str) -> bool {
        let Some(delay) = self.delay() else {
            trace!("cooldown disabled, not arming {group}");
            return false;
        };

        let until = Instant::now() + delay;
        self.deadlines().insert(group.to_string(), until);

        let ledger = self.clone();
        let expired_group = group.to_string();
        let restarted = self.timers.schedule(group.to_string(), delay, async move {
            ledger.expire(&expired_group).await;
        });

        if restarted {
            debug!("restarted {delay:?} cooldown for {group}");
        } else {
            info!("starting {delay:?} cooldown for {group}");
        }

        self.publish(group, true).await;
        true
    }

    /// Claim `group` if it is READY; test and set happen under one lock
    ///
    /// Returns `false` when the group is cooling or already claimed. With cooldown disabled
    /// every claim succeeds and nothing is recorded.
    pub fn try_reserve(&self, group: &str) -> bool {
        let Some(delay) = self.delay() else {
            return true;
        };

        let now = Instant::now();
        let mut deadlines = self.deadlines();
        if deadlines.get(group).is_some_and(|until| *until > now) {
            return false;
        }

        deadlines.insert(group.to_string(), now + delay.max(RESERVATION_HOLD));
        trace!("reserved {group}");
        true
    }

    /// Drop a reservation that did not lead to an actuation
    pub fn release(&self, group: &str) {
        if !self.timers.is_pending(&group.to_string()) {
            self.deadlines().remove(group);
            trace!("released {group}");
        }
    }

    async fn expire(&self, group: &str) {
        let expired = {
            let mut deadlines = self.deadlines();
            match deadlines.get(group) {
                Some(until) if *until <= Instant::now() => {
                    deadlines.remove(group);
                    true
                }
                _ => false,
            }
        };

        if expired {
            info!("cooldown ended for {group}");
            self.publish(group, false).await;
        }
    }

    /// Force `group` back to READY
    pub async fn clear(&self, group: &str) {
        self.timers.cancel(&group.to_string());
        self.deadlines().remove(group);
        info!("manually cleared cooldown for {group}");
        self.publish(group, false).await;
    }

    /// Clear every group that currently has a running cooldown timer
    pub async fn clear_all(&self) -> Vec<String> {
        let groups = self.timers.pending_keys();
        for group in &groups {
            self.clear(group).await;
        }
        info!("cleared {} cooldown(s)", groups.len());
        groups
    }

    pub fn state(&self, group: &str) -> CooldownState {
        if self.delay().is_none() {
            return CooldownState::Ready;
        }

        match self.deadlines().get(group) {
            Some(until) if *until > Instant::now() => CooldownState::Cooling { until: *until },
            _ => CooldownState::Ready,
        }
    }

    pub fn is_cooling(&self, group: &str) -> bool {
        matches!(self.state(group), CooldownState::Cooling { .. })
    }

    pub fn remaining(&self, group: &str) -> Option<Duration> {
        match self.state(group) {
            CooldownState::Cooling { until } => {
                Some(until.saturating_duration_since(Instant::now()))
            }
            CooldownState::Ready => None,
        }
    }

    /// Cooldown flag for each of `groups`
    pub fn status(&self, groups: &[String]) -> BTreeMap<String, bool> {
        groups
            .iter()
            .map(|group| (group.clone(), self.is_cooling(group)))
            .collect()
    }

    /// Cancel every running timer and publish READY for the groups it held; used on shutdown
    pub async fn cancel_timers(&self) -> Vec<String> {
        let cancelled = self.timers.cancel_all();
        self.deadlines().clear();
        for group in &cancelled {
            self.publish(group, false).await;
        }
        cancelled
    }

    async fn publish(&self, group: &str, cooling: bool) {
        let prefix = self.config.borrow().osc.parameter_prefix.clone();
        let address = parameter_address(&prefix, group, Parameter::Cooldown);

        match self.sink.send(&address, vec![OscType::Bool(cooling)]).await {
            Ok(()) => trace!("sent {address} = {cooling}"),
            Err(e) => warn!("failed to publish cooldown status {address}: {e}"),
        }
    }
}

//! Message types for actor communication
//!
//! Commands go to one actor over its mpsc channel; events fan out over broadcast channels.
//! Everything published is `Clone` so every subscriber gets its own copy.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::osc::router::Registration;

/// Where a locally issued shock came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShockSource {
    /// Explicit trigger on the inbound bus, or a direct API call
    Dispatch,

    /// Probability or hold rule of a trigger variable (its display name)
    Trigger(String),
}

/// Published once per group whenever this process issues a shock
///
/// The broadcast channel may drop events for slow subscribers; the display only ever shows
/// the latest one, so gaps are harmless.
#[derive(Debug, Clone, PartialEq)]
pub struct ShockEvent {
    pub group: String,
    pub intensity: u8,

    /// Seconds
    pub duration: f64,
    pub source: ShockSource,
    pub timestamp: DateTime<Utc>,
}

/// Commands that can be sent to the trigger engine
#[derive(Debug)]
pub enum TriggerCommand {
    /// Evaluate every variable now, bypassing the poll interval
    TickNow { respond_to: oneshot::Sender<TickReport> },

    Shutdown,
}

/// What a single evaluation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Variables that were enabled and evaluated
    pub evaluated: usize,

    /// Variables whose value was under their threshold
    pub below_threshold: usize,

    /// Probability draws that succeeded
    pub probability_hits: usize,

    /// Hold timers armed during this pass
    pub holds_armed: usize,
}

/// Commands that can be sent to the display coordinator
#[derive(Debug)]
pub enum DisplayCommand {
    /// Mark the display dirty; coalesces with any request not yet sent
    Refresh,

    GetPhase { respond_to: oneshot::Sender<DisplayPhase> },

    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPhase {
    Idle,
    Pending,
    Sending,
}

/// Commands that can be sent to the hub listener
#[derive(Debug)]
pub enum HubCommand {
    /// Drop the current connection, if any, and connect again
    Reconnect,

    Shutdown,
}

/// Lifecycle of the streaming hub connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Negotiating,
    Connecting,
    Connected,
    Closing,
}

/// Commands that can be sent to the inbound bus router
#[derive(Debug)]
pub enum RouterCommand {
    GetRoutes {
        respond_to: oneshot::Sender<Vec<(String, Registration)>>,
    },

    Shutdown,
}

pub mod actors;
pub mod config;
pub mod cooldown;
pub mod dispatcher;
pub mod error;
pub mod openshock;
pub mod osc;
pub mod service;
pub mod state;
pub mod telemetry;
pub mod timers;
pub mod util;

use serde::{Deserialize, Serialize};

/// Kind of actuation a shocker performs
///
/// Serialized by name for the control API. Deserializes from either the name or the
/// numeric code (`0` stop, `1` shock, `2` vibrate, `3` sound) used by the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", try_from = "RawActionKind")]
pub enum ActionKind {
    Stop,
    Shock,
    Vibrate,
    Sound,
}

impl ActionKind {
    /// Shock-class actuations consult and arm per-group cooldown; the others never do
    pub fn is_shock(self) -> bool {
        matches!(self, ActionKind::Shock)
    }

    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Stop => "stop",
            ActionKind::Shock => "shock",
            ActionKind::Vibrate => "vibrate",
            ActionKind::Sound => "sound",
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawActionKind {
    Code(u8),
    Name(String),
}

impl TryFrom<RawActionKind> for ActionKind {
    type Error = String;

    fn try_from(raw: RawActionKind) -> Result<Self, Self::Error> {
        match raw {
            RawActionKind::Code(0) => Ok(ActionKind::Stop),
            RawActionKind::Code(1) => Ok(ActionKind::Shock),
            RawActionKind::Code(2) => Ok(ActionKind::Vibrate),
            RawActionKind::Code(3) => Ok(ActionKind::Sound),
            RawActionKind::Code(code) => Err(format!("unknown action code {code}")),
            RawActionKind::Name(name) => match name.to_ascii_lowercase().as_str() {
                "stop" => Ok(ActionKind::Stop),
                "shock" => Ok(ActionKind::Shock),
                "vibrate" => Ok(ActionKind::Vibrate),
                "sound" => Ok(ActionKind::Sound),
                _ => Err(format!("unknown action kind {name}")),
            },
        }
    }
}

/// A single remotely addressable shocker and its group assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shocker {
    pub id: String,
    pub group: String,
    pub name: Option<String>,
}

/// An actuation addressed to concrete shockers
///
/// Intensity is clamped to `0..=100` on construction and the duration is kept in
/// seconds; transports convert it into their own units.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuationCommand {
    pub shocker_ids: Vec<String>,
    pub intensity: u8,
    pub duration: f64,
    pub kind: ActionKind,
}

impl ActuationCommand {
    pub fn new(shocker_ids: Vec<String>, intensity: i32, duration: f64, kind: ActionKind) -> Self {
        Self {
            shocker_ids,
            intensity: util::clamp_intensity(intensity),
            duration,
            kind,
        }
    }
}

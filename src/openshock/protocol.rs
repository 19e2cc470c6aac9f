//! Streaming hub wire protocol
//!
//! Text frames carry one or more JSON messages, each terminated by the record separator
//! (`0x1E`). After the handshake, every message has a numeric `type`:
//!
//! - `1` invocation, dispatched by `target` (`Log` carries control events)
//! - `6` ping
//! - `7` close
//!
//! The handshake acknowledgement is the only message without a `type`.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::ActionKind;
use crate::config::OpenShockConfig;
use crate::error::{ShockError, ShockResult};

pub const RECORD_SEPARATOR: char = '\u{1e}';

/// User id the service reports for guests acting through a share link
pub const GUEST_USER_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Invocation target carrying control log entries
pub const LOG_TARGET: &str = "Log";

const INVOCATION: u64 = 1;
const PING: u64 = 6;
const CLOSE: u64 = 7;

pub fn handshake_frame() -> String {
    format!(
        "{}{RECORD_SEPARATOR}",
        serde_json::json!({ "protocol": "json", "version": 1 })
    )
}

pub fn ping_frame() -> String {
    format!("{}{RECORD_SEPARATOR}", serde_json::json!({ "type": PING }))
}

/// Split a transport frame into its JSON messages
pub fn split_frames(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR)
        .filter(|message| !message.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    HandshakeAck { error: Option<String> },
    Invocation { target: String, arguments: Vec<Value> },
    Ping,
    Close { error: Option<String> },
    Other { kind: u64 },
}

pub fn parse_message(raw: &str) -> ShockResult<HubMessage> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ShockError::Framing(format!("{e}: {raw}")))?;

    let Some(object) = value.as_object() else {
        return Err(ShockError::Framing(format!("not a JSON object: {raw}")));
    };

    let error = object
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string);

    let Some(kind) = object.get("type") else {
        return Ok(HubMessage::HandshakeAck { error });
    };

    let kind = kind
        .as_u64()
        .ok_or_else(|| ShockError::Framing(format!("non-numeric message type: {raw}")))?;

    match kind {
        INVOCATION => {
            let target = object
                .get("target")
                .and_then(Value::as_str)
                .ok_or_else(|| ShockError::Framing(format!("invocation without target: {raw}")))?
                .to_string();
            let arguments = match object.get("arguments") {
                Some(Value::Array(arguments)) => arguments.clone(),
                _ => Vec::new(),
            };
            Ok(HubMessage::Invocation { target, arguments })
        }
        PING => Ok(HubMessage::Ping),
        CLOSE => Ok(HubMessage::Close { error }),
        kind => Ok(HubMessage::Other { kind }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogSender {
    id: String,
    name: String,
    custom_name: Option<String>,
    #[serde(default)]
    additional_items: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct LogShocker {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ControlLog {
    shocker: LogShocker,
    #[serde(rename = "type")]
    kind: ActionKind,
    intensity: u32,
    duration: u32,
}

/// An actuation performed by someone else through the remote service
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEvent {
    /// Name shown for the acting user: custom name if set, else the account name
    pub user_name: String,
    pub real_name: String,
    pub shocker_id: String,
    pub shocker_name: String,
    /// Configured group of the shocker, else its name
    pub target: String,
    pub kind: ActionKind,
    pub intensity: u8,
    pub duration_ms: u32,
    pub is_guest: bool,
    pub share_link_id: Option<String>,
}

impl RemoteEvent {
    /// Replace `target` with the shocker's configured group, if it has one
    pub fn resolve_target(mut self, api: &OpenShockConfig) -> Self {
        if let Some(group) = api.group_of(&self.shocker_id) {
            self.target = group.to_string();
        }
        self
    }
}

/// Events of a `Log` invocation, all kinds included
pub fn log_events(arguments: &[Value]) -> ShockResult<Vec<RemoteEvent>> {
    let [sender, logs, ..] = arguments else {
        return Err(ShockError::Framing(format!(
            "log invocation needs 2 arguments, got {}",
            arguments.len()
        )));
    };

    let sender: LogSender = serde_json::from_value(sender.clone())
        .map_err(|e| ShockError::Framing(format!("invalid log sender: {e}")))?;
    let logs: Vec<ControlLog> = serde_json::from_value(logs.clone())
        .map_err(|e| ShockError::Framing(format!("invalid log entries: {e}")))?;

    let user_name = sender
        .custom_name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| sender.name.clone());
    let is_guest = sender.id == GUEST_USER_ID;
    let share_link_id = sender
        .additional_items
        .get("shareLinkId")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(logs
        .into_iter()
        .map(|log| RemoteEvent {
            user_name: user_name.clone(),
            real_name: sender.name.clone(),
            target: log.shocker.name.clone(),
            shocker_id: log.shocker.id,
            shocker_name: log.shocker.name,
            kind: log.kind,
            intensity: log.intensity.min(100) as u8,
            duration_ms: log.duration,
            is_guest,
            share_link_id: share_link_id.clone(),
        })
        .collect())
}

/// Shock events of a `Log` invocation; vibrate, sound and stop entries are dropped
pub fn shock_events(arguments: &[Value]) -> ShockResult<Vec<RemoteEvent>> {
    Ok(log_events(arguments)?
        .into_iter()
        .filter(|event| event.kind.is_shock())
        .collect())
}

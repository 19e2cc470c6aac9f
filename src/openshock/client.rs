//! HTTP client for the remote control API
//!
//! One `reqwest::Client` is built up front and reused for every call; the 5 second timeout
//! bounds each request so a slow remote cannot hold a caller for long.

use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use super::{TOKEN_HEADER, USER_AGENT};
use crate::config::OpenShockConfig;
use crate::error::{ShockError, ShockResult};
use crate::util::{clamp_duration_ms, mask_token};
use crate::{ActionKind, ActuationCommand};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    pub shocks: Vec<ShockControl>,
    pub custom_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShockControl {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub intensity: u8,
    /// Milliseconds, always inside the accepted band; the wire name is `duration`
    pub duration: u32,
    pub exclusive: bool,
}

impl ControlRequest {
    pub fn from_command(command: &ActuationCommand, custom_name: &str) -> Self {
        let duration = clamp_duration_ms(command.duration);
        Self {
            shocks: command
                .shocker_ids
                .iter()
                .map(|id| ShockControl {
                    id: id.clone(),
                    kind: command.kind,
                    intensity: command.intensity.min(100),
                    duration,
                    exclusive: true,
                })
                .collect(),
            custom_name: custom_name.to_string(),
        }
    }
}

/// Response of the hub negotiate call
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    pub connection_token: Option<String>,
    pub connection_id: Option<String>,
}

impl NegotiateResponse {
    /// Identifier to present when opening the hub connection
    pub fn connection_token(&self) -> Option<&str> {
        self.connection_token
            .as_deref()
            .or(self.connection_id.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnDevice {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub shockers: Vec<OwnShocker>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnShocker {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Clone)]
pub struct OpenShockClient {
    client: Client,
}

impl OpenShockClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    fn url(api: &OpenShockConfig, path: &str) -> String {
        format!("{}{path}", api.api_url.trim_end_matches('/'))
    }

    /// Send `command` to its shockers; only a 200 answer counts as accepted
    #[instrument(skip_all, fields(kind = command.kind.label(), shockers = command.shocker_ids.len()))]
    pub async fn control(
        &self,
        api: &OpenShockConfig,
        command: &ActuationCommand,
    ) -> ShockResult<()> {
        let token = api.credential().ok_or(ShockError::MissingCredential)?;
        if command.shocker_ids.is_empty() {
            return Err(ShockError::NoTargets);
        }

        let url = Self::url(api, "/2/shockers/control");
        let body = ControlRequest::from_command(command, &api.custom_name);

        debug!(
            "sending control to {url} with token {}: {} shocker(s), {}%, {}ms",
            mask_token(token),
            body.shocks.len(),
            command.intensity,
            clamp_duration_ms(command.duration)
        );

        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status != StatusCode::OK {
            return Err(ShockError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if !text.trim().is_empty() {
            serde_json::from_str::<serde_json::Value>(&text)
                .map_err(|e| ShockError::MalformedResponse(e.to_string()))?;
        }

        trace!("control accepted");
        Ok(())
    }

    /// Ask the hub for a connection token
    #[instrument(skip_all)]
    pub async fn negotiate(&self, api: &OpenShockConfig) -> ShockResult<NegotiateResponse> {
        let token = api.credential().ok_or(ShockError::MissingCredential)?;
        let url = Self::url(api, "/1/hubs/user/negotiate?negotiateVersion=1");

        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, token)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ShockError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| ShockError::MalformedResponse(e.to_string()))
    }

    /// List the account's devices and their shockers
    #[instrument(skip_all)]
    pub async fn own_devices(&self, api: &OpenShockConfig) -> ShockResult<Vec<OwnDevice>> {
        let token = api.credential().ok_or(ShockError::MissingCredential)?;
        let url = Self::url(api, "/1/shockers/own");

        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, token)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status != StatusCode::OK {
            return Err(ShockError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str::<DataEnvelope<Vec<OwnDevice>>>(&text)
            .map(|envelope| envelope.data)
            .map_err(|e| ShockError::MalformedResponse(e.to_string()))
    }
}

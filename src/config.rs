use std::collections::BTreeMap;
use std::net::SocketAddr;

use tracing::trace;

use crate::Shocker;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub osc: OscConfig,
    #[serde(default)]
    pub shock: ShockConfig,
    #[serde(default)]
    pub openshock: OpenShockConfig,
    #[serde(default)]
    pub slide: SlideConfig,
    #[serde(default)]
    pub display: DisplayConfig,

    /// Explicit inbound triggers. When empty, every group gets `{prefix}{group}` → shock.
    #[serde(default)]
    pub triggers: Vec<AddressTrigger>,
}

impl Config {
    /// Triggers in effect, including the per-group defaults
    pub fn effective_triggers(&self) -> Vec<AddressTrigger> {
        if !self.triggers.is_empty() {
            return self.triggers.clone();
        }

        self.shock
            .groups
            .iter()
            .map(|group| AddressTrigger {
                address: format!("{}{group}", self.osc.parameter_prefix),
                action: TriggerAction::Shock,
                groups: Some(vec![group.clone()]),
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OscConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_target")]
    pub target: SocketAddr,
    #[serde(default = "default_parameter_prefix")]
    pub parameter_prefix: String,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            target: default_target(),
            parameter_prefix: default_parameter_prefix(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9001))
}

fn default_target() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

fn default_parameter_prefix() -> String {
    "/avatar/parameters/ShockOsc/".to_string()
}

/// How the intensity of a group-level actuation is chosen
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum IntensityMode {
    Static {
        #[serde(default = "default_static_intensity")]
        intensity: i32,
    },
    Random {
        #[serde(default = "default_random_min")]
        min: i32,
        #[serde(default = "default_random_max")]
        max: i32,
    },
}

impl Default for IntensityMode {
    fn default() -> Self {
        IntensityMode::Static {
            intensity: default_static_intensity(),
        }
    }
}

fn default_static_intensity() -> i32 {
    50
}

fn default_random_min() -> i32 {
    20
}

fn default_random_max() -> i32 {
    80
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ShockConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub intensity: IntensityMode,

    /// Actuation duration in seconds
    #[serde(default = "default_duration")]
    pub duration: f64,

    /// Per-group lockout in seconds; `<= 0` disables cooldown entirely
    #[serde(default = "default_cooldown_delay")]
    pub cooldown_delay: f64,

    /// Default hold time for trigger variables that do not set their own
    #[serde(default = "default_hold_time")]
    pub hold_time: f64,
    #[serde(default = "default_groups")]
    pub groups: Vec<String>,
    #[serde(default = "default_true")]
    pub show_shock_info: bool,
}

impl Default for ShockConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            intensity: IntensityMode::default(),
            duration: default_duration(),
            cooldown_delay: default_cooldown_delay(),
            hold_time: default_hold_time(),
            groups: default_groups(),
            show_shock_info: true,
        }
    }
}

fn default_duration() -> f64 {
    1.0
}

fn default_cooldown_delay() -> f64 {
    5.0
}

fn default_hold_time() -> f64 {
    0.5
}

fn default_groups() -> Vec<String> {
    vec!["leftleg".to_string(), "rightleg".to_string()]
}

fn default_true() -> bool {
    true
}

/// A shocker's group assignment, either just the group name or a detailed entry
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(untagged)]
pub enum ShockerAssignment {
    Group(String),
    Detailed { group: String, name: Option<String> },
}

impl ShockerAssignment {
    pub fn group(&self) -> &str {
        match self {
            ShockerAssignment::Group(group) => group,
            ShockerAssignment::Detailed { group, .. } => group,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ShockerAssignment::Group(_) => None,
            ShockerAssignment::Detailed { name, .. } => name.as_deref(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OpenShockConfig {
    pub token: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL of the streaming hub, defaults to `api_url`
    pub hub_url: Option<String>,
    #[serde(default = "default_custom_name")]
    pub custom_name: String,

    /// Shocker id → group. Keyed by id, so a later assignment replaces an earlier one.
    #[serde(default)]
    pub shockers: BTreeMap<String, ShockerAssignment>,
}

impl Default for OpenShockConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
            hub_url: None,
            custom_name: default_custom_name(),
            shockers: BTreeMap::new(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.openshock.app".to_string()
}

fn default_custom_name() -> String {
    "ShockOsc".to_string()
}

impl OpenShockConfig {
    /// The configured token, ignoring blank values
    pub fn credential(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Whether the remote transport should be attempted at all
    pub fn remote_enabled(&self) -> bool {
        self.credential().is_some() && !self.shockers.is_empty()
    }

    pub fn shockers(&self) -> impl Iterator<Item = Shocker> + '_ {
        self.shockers.iter().map(|(id, assignment)| Shocker {
            id: id.clone(),
            group: assignment.group().to_string(),
            name: assignment.name().map(str::to_string),
        })
    }

    pub fn group_of(&self, shocker_id: &str) -> Option<&str> {
        self.shockers.get(shocker_id).map(ShockerAssignment::group)
    }

    /// Shocker ids assigned to any of the given groups, in id order
    pub fn shockers_in_groups(&self, groups: &[String]) -> Vec<String> {
        self.shockers
            .iter()
            .filter(|(_, assignment)| groups.iter().any(|g| g == assignment.group()))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SlideConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,

    /// Per-variable suppression window after a probability trigger, in seconds
    #[serde(default = "default_probability_cooldown")]
    pub probability_cooldown: f64,
    #[serde(default = "default_random_min")]
    pub intensity_min: i32,
    #[serde(default = "default_random_max")]
    pub intensity_max: i32,
    #[serde(default = "default_hold_intensity_min")]
    pub hold_intensity_min: i32,
    #[serde(default = "default_hold_intensity_max")]
    pub hold_intensity_max: i32,
    #[serde(default)]
    pub variables: Vec<TriggerVariable>,
}

impl Default for SlideConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval: default_poll_interval(),
            probability_cooldown: default_probability_cooldown(),
            intensity_min: default_random_min(),
            intensity_max: default_random_max(),
            hold_intensity_min: default_hold_intensity_min(),
            hold_intensity_max: default_hold_intensity_max(),
            variables: Vec::new(),
        }
    }
}

fn default_poll_interval() -> f64 {
    1.0
}

fn default_probability_cooldown() -> f64 {
    2.0
}

fn default_hold_intensity_min() -> i32 {
    50
}

fn default_hold_intensity_max() -> i32 {
    100
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TriggerVariable {
    pub name: Option<String>,
    pub path: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub threshold: f32,

    /// Explicit shocker subset; empty means every mapped shocker
    #[serde(default)]
    pub shockers: Vec<String>,
    pub hold: Option<HoldSettings>,
}

impl TriggerVariable {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HoldSettings {
    #[serde(default = "default_hold_threshold")]
    pub threshold: f32,

    /// Seconds the value must stay up; falls back to `shock.hold_time`
    pub time: Option<f64>,
}

fn default_hold_threshold() -> f32 {
    0.9
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_display_address")]
    pub address: String,

    /// Minimum seconds between two emitted status lines
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    #[serde(default = "default_tick")]
    pub tick: f64,
    #[serde(default = "default_true")]
    pub show_time: bool,
    #[serde(default = "default_true")]
    pub notify: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_display_address(),
            rate_limit: default_rate_limit(),
            tick: default_tick(),
            show_time: true,
            notify: true,
        }
    }
}

fn default_display_address() -> String {
    "/chatbox/input".to_string()
}

fn default_rate_limit() -> f64 {
    1.5
}

fn default_tick() -> f64 {
    0.1
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct AddressTrigger {
    pub address: String,
    pub action: TriggerAction,

    /// Target groups; `None` means the configured default groups
    pub groups: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAction {
    Shock,
    ImmediateShock,
    Vibrate,
    Stop,
    StopVibrate,
    ClearCooldowns,
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config: &Config| {
            trace!(
                "loaded config with {} shocker(s), {} variable(s)",
                config.openshock.shockers.len(),
                config.slide.variables.len()
            )
        })
}

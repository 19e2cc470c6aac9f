//! Local wire protocol (OSC over UDP)
//!
//! Outbound parameters are addressed as `{prefix}{group}_{suffix}`, e.g.
//! `/avatar/parameters/ShockOsc/leftleg_CShock`. Inbound messages are routed through the
//! registration table in [`router`].

pub mod memory;
pub mod router;
pub mod sink;

pub use memory::MemorySink;
pub use sink::{OscSink, UdpSink};

/// Per-group output parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    /// Continuous shock intensity, float `0.0..=1.0`
    ContinuousShock,
    /// Momentary shock, bool
    ImmediateShock,
    /// Continuous vibration intensity, float `0.0..=1.0`
    ContinuousVibrate,
    /// Group cooldown status, bool
    Cooldown,
}

impl Parameter {
    pub fn suffix(self) -> &'static str {
        match self {
            Parameter::ContinuousShock => "CShock",
            Parameter::ImmediateShock => "IShock",
            Parameter::ContinuousVibrate => "CVibrate",
            Parameter::Cooldown => "Cooldown",
        }
    }
}

pub fn parameter_address(prefix: &str, group: &str, parameter: Parameter) -> String {
    format!("{prefix}{group}_{}", parameter.suffix())
}

use std::time::Duration;

use rosc::OscType;

/// Lowest duration the remote control API accepts, in milliseconds
pub const MIN_REMOTE_DURATION_MS: u32 = 300;

/// Highest duration the remote control API accepts, in milliseconds
pub const MAX_REMOTE_DURATION_MS: u32 = 30_000;

pub fn clamp_intensity(intensity: i32) -> u8 {
    intensity.clamp(0, 100) as u8
}

/// Seconds to milliseconds, forced into the remote API's accepted band
pub fn clamp_duration_ms(seconds: f64) -> u32 {
    let millis = (seconds * 1000.0).round();
    if millis.is_nan() {
        return MIN_REMOTE_DURATION_MS;
    }
    millis.clamp(MIN_REMOTE_DURATION_MS as f64, MAX_REMOTE_DURATION_MS as f64) as u32
}

/// Seconds from configuration as a `Duration`; negative or non-finite values become zero
pub fn duration_from_secs(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or_default()
}

/// Hide all but the last four characters of a token for logging
pub fn mask_token(token: &str) -> String {
    let count = token.chars().count();
    if count <= 4 {
        return "***".to_string();
    }
    let tail: String = token.chars().skip(count - 4).collect();
    format!("{}{tail}", "*".repeat(count - 4))
}

/// Whether an inbound bus argument counts as "set"
pub fn is_truthy(arg: &OscType) -> bool {
    match arg {
        OscType::Bool(value) => *value,
        OscType::Int(value) => *value != 0,
        OscType::Long(value) => *value != 0,
        OscType::Float(value) => *value != 0.0,
        OscType::Double(value) => *value != 0.0,
        OscType::String(value) => !value.is_empty(),
        _ => false,
    }
}

/// Numeric value of an inbound bus argument, if it carries one
pub fn as_float(arg: &OscType) -> Option<f32> {
    match arg {
        OscType::Float(value) => Some(*value),
        OscType::Double(value) => Some(*value as f32),
        OscType::Int(value) => Some(*value as f32),
        OscType::Long(value) => Some(*value as f32),
        OscType::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
        _ => None,
    }
}

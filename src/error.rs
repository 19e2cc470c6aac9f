//! Error types for actuation and remote transport operations

use std::fmt;

/// Result type alias for actuation operations
pub type ShockResult<T> = Result<T, ShockError>;

/// Errors that can occur while dispatching actuations or talking to the remote API
///
/// The variants fall into three classes:
///
/// - **Configuration**: nothing was attempted (`Disabled`, `MissingCredential`, `NoTargets`).
///   Callers log these as no-ops.
/// - **Transport**: an attempt was made and failed (`Status`, `Network`, `MalformedResponse`,
///   `Osc`, `Io`, `Stream`). On the dispatcher path this triggers the local fallback.
/// - **Framing**: a streaming frame could not be understood (`Framing`).
#[derive(Debug)]
pub enum ShockError {
    /// Actuation is switched off in the configuration
    Disabled,

    /// No remote API token configured
    MissingCredential,

    /// The resolved target set was empty
    NoTargets,

    /// Remote API answered with a non-success status
    Status { status: u16, body: String },

    /// Remote API could not be reached
    Network(reqwest::Error),

    /// Remote API answered with a body we could not parse
    MalformedResponse(String),

    /// OSC packet could not be encoded or decoded
    Osc(String),

    /// Socket I/O error
    Io(std::io::Error),

    /// Streaming hub connection could not be opened or broke
    Stream(String),

    /// Streaming frame could not be parsed
    Framing(String),
}

impl ShockError {
    /// Whether this error means nothing was attempted
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ShockError::Disabled | ShockError::MissingCredential | ShockError::NoTargets
        )
    }

    /// Whether this error came from a failed transport attempt
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ShockError::Status { .. }
                | ShockError::Network(_)
                | ShockError::MalformedResponse(_)
                | ShockError::Osc(_)
                | ShockError::Io(_)
                | ShockError::Stream(_)
        )
    }
}

impl fmt::Display for ShockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShockError::Disabled => write!(f, "actuation is disabled"),
            ShockError::MissingCredential => write!(f, "no remote API token configured"),
            ShockError::NoTargets => write!(f, "no actuation targets resolved"),
            ShockError::Status { status, body } => {
                write!(f, "remote API returned status {}: {}", status, body)
            }
            ShockError::Network(err) => write!(f, "remote API unreachable: {}", err),
            ShockError::MalformedResponse(msg) => {
                write!(f, "malformed remote API response: {}", msg)
            }
            ShockError::Osc(msg) => write!(f, "OSC error: {}", msg),
            ShockError::Io(err) => write!(f, "I/O error: {}", err),
            ShockError::Stream(msg) => write!(f, "hub connection error: {}", msg),
            ShockError::Framing(msg) => write!(f, "stream framing error: {}", msg),
        }
    }
}

impl std::error::Error for ShockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShockError::Network(err) => Some(err),
            ShockError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ShockError {
    fn from(err: std::io::Error) -> Self {
        ShockError::Io(err)
    }
}

impl From<reqwest::Error> for ShockError {
    fn from(err: reqwest::Error) -> Self {
        ShockError::Network(err)
    }
}

impl From<rosc::OscError> for ShockError {
    fn from(err: rosc::OscError) -> Self {
        ShockError::Osc(format!("{err:?}"))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ShockError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ShockError::Stream(err.to_string())
    }
}

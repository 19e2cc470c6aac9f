//! Remote shocker service: HTTP control API and streaming hub protocol

pub mod client;
pub mod protocol;

pub use client::OpenShockClient;
pub use protocol::RemoteEvent;

/// Header carrying the API token on every remote request
pub const TOKEN_HEADER: &str = "OpenShockToken";

pub const USER_AGENT: &str = concat!("shockosc/", env!("CARGO_PKG_VERSION"));

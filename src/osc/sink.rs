//! Outbound OSC sink trait and the UDP implementation

use std::net::SocketAddr;

use async_trait::async_trait;
use rosc::{OscMessage, OscPacket, OscType, encoder};
use tokio::net::UdpSocket;
use tracing::trace;

use crate::error::ShockResult;

/// Destination for outbound wire-protocol messages
///
/// Implementations must be `Send + Sync`; one sink is shared by the dispatcher, the cooldown
/// ledger and the display coordinator.
#[async_trait]
pub trait OscSink: Send + Sync {
    async fn send(&self, address: &str, args: Vec<OscType>) -> ShockResult<()>;
}

/// Sends each message as a single UDP datagram
pub struct UdpSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpSink {
    /// Bind an ephemeral local socket that sends to `target`
    pub async fn bind(target: SocketAddr) -> ShockResult<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

#[async_trait]
impl OscSink for UdpSink {
    async fn send(&self, address: &str, args: Vec<OscType>) -> ShockResult<()> {
        let packet = OscPacket::Message(OscMessage {
            addr: address.to_string(),
            args,
        });
        let bytes = encoder::encode(&packet)?;
        self.socket.send_to(&bytes, self.target).await?;
        trace!("sent {address} to {}", self.target);
        Ok(())
    }
}

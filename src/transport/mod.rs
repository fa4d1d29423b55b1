//! Transport layer
//!
//! Abstracts the datagram link to the gateway behind [`GatewaySocket`]:
//! outgoing messages are accepted whole, incoming datagrams arrive
//! already decoded. Implementations:
//! - UDP (the real thing)
//! - an in-memory mock for exercising the client without a network

mod mock;
mod udp;

pub use mock::{MockGateway, MockSocket};
pub use udp::UdpGatewaySocket;

use crate::protocol::{HostInfo, Message, ProtocolError};
use async_trait::async_trait;
use std::io;
use thiserror::Error;

/// Transport layer errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport closed")]
    Closed,
}

/// Duplex message link to a KNXnet/IP gateway
///
/// Both halves close independently: `close_out` fails every later
/// `send`, `close_in` ends the inbound stream. The client layer owns
/// exactly one socket per connection and is its only reader.
#[async_trait]
pub trait GatewaySocket: Send + Sync {
    /// Send one message to the gateway
    async fn send(&self, msg: Message) -> Result<(), TransportError>;

    /// Wait for the next decoded message from the gateway
    ///
    /// Fails with [`TransportError::Closed`] once the inbound half is
    /// closed and drained.
    async fn recv(&self) -> Result<Message, TransportError>;

    /// The local endpoint, as the gateway should address it
    fn local_host_info(&self) -> HostInfo;

    /// Stop delivering inbound messages
    fn close_in(&self);

    /// Stop accepting outbound messages
    fn close_out(&self);

    /// Close both halves
    fn close(&self) {
        self.close_in();
        self.close_out();
    }
}

//! # knx-tunnel
//!
//! A KNXnet/IP tunneling client: connects to a KNX/IP gateway over UDP,
//! keeps the tunnel alive and ferries CEMI frames between the application
//! and the KNX bus.
//!
//! ## Features
//!
//! - **Connection lifecycle** with automatic resends, busy-gateway retry
//!   and orderly disconnect
//! - **Heartbeat** polling of the gateway's connection state
//! - **Reliable tunneling** with per-direction sequence numbers,
//!   duplicate suppression and acknowledgements
//! - **Pluggable transport** for testing or non-UDP gateways
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Application Layer                   │
//! │          (Tunnel: connect / send / recv)             │
//! ├─────────────────────────────────────────────────────┤
//! │                   Client Layer                       │
//! │   (dispatcher, heartbeat, resend, sequence state)    │
//! ├─────────────────────────────────────────────────────┤
//! │                  Protocol Layer                      │
//! │       (KNXnet/IP messages, byte-level codec)         │
//! ├─────────────────────────────────────────────────────┤
//! │                 Transport Layer                      │
//! │            (UDP socket, mock for tests)              │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod protocol;
pub mod transport;

pub use client::Tunnel;
pub use config::ClientConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default UDP port of a KNXnet/IP gateway
pub const DEFAULT_GATEWAY_PORT: u16 = 3671;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("Client error: {0}")]
    Client(#[from] client::ClientError),

    #[error("Configuration error: {0}")]
    Config(String),
}

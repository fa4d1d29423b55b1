//! KNXnet/IP protocol definitions
//!
//! Message variants for the tunneling services, their wire codec and the
//! constants both share. Only the services a tunneling client exchanges
//! with its gateway are covered; routing, discovery and device management
//! live outside this crate.

mod codec;
mod message;

pub use codec::{decode, encode};
pub use message::{
    ConnState, ConnResStatus, ConnectionRequest, ConnectionResponse, ConnectionStateRequest,
    ConnectionStateResponse, DisconnectRequest, DisconnectResponse, HostInfo, Message,
    TunnelRequest, TunnelResponse,
};

use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Frame ends unexpectedly")]
    UnexpectedEnd,

    #[error("Unsupported protocol version: {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("Unknown service identifier: {0:#06x}")]
    UnknownService(u16),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Malformed structure: {0}")]
    Malformed(&'static str),
}

/// Protocol version 1.0
pub const PROTOCOL_VERSION: u8 = 0x10;

/// Length of the KNXnet/IP header
pub const HEADER_SIZE: usize = 6;

/// Largest frame this client will produce or accept
pub const MAX_FRAME_SIZE: usize = 1024;

/// Service identifier of CONNECT_REQUEST
pub const SERVICE_CONNECT_REQUEST: u16 = 0x0205;
/// Service identifier of CONNECT_RESPONSE
pub const SERVICE_CONNECT_RESPONSE: u16 = 0x0206;
/// Service identifier of CONNECTIONSTATE_REQUEST
pub const SERVICE_CONNECTIONSTATE_REQUEST: u16 = 0x0207;
/// Service identifier of CONNECTIONSTATE_RESPONSE
pub const SERVICE_CONNECTIONSTATE_RESPONSE: u16 = 0x0208;
/// Service identifier of DISCONNECT_REQUEST
pub const SERVICE_DISCONNECT_REQUEST: u16 = 0x0209;
/// Service identifier of DISCONNECT_RESPONSE
pub const SERVICE_DISCONNECT_RESPONSE: u16 = 0x020A;
/// Service identifier of TUNNELING_REQUEST
pub const SERVICE_TUNNELING_REQUEST: u16 = 0x0420;
/// Service identifier of TUNNELING_ACK
pub const SERVICE_TUNNELING_ACK: u16 = 0x0421;

/// Connection type code for a tunnel connection
pub const TUNNEL_CONNECTION: u8 = 0x04;

/// KNX layer code for link-layer tunneling
pub const TUNNEL_LINK_LAYER: u8 = 0x02;

/// Host protocol code for IPv4 UDP
pub const IPV4_UDP: u8 = 0x01;

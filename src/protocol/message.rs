//! Message types for the KNXnet/IP tunneling services
//!
//! One struct per service frame plus the [`Message`] enum the transport
//! hands to the client layer. The CEMI payload of a tunneling request is
//! carried opaquely; interpreting it is the application's business.

use bytes::Bytes;
use std::fmt;
use std::net::Ipv4Addr;

/// An address/port pair a gateway replies to.
///
/// Registered as control and data endpoint during the connection
/// handshake. Only IPv4 UDP endpoints are representable, which is what
/// the tunneling profile of the protocol supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostInfo {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl HostInfo {
    pub const fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }

    /// `0.0.0.0:0`, telling the gateway to reply to the datagram's source
    pub const UNSPECIFIED: HostInfo = HostInfo::new(Ipv4Addr::UNSPECIFIED, 0);
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Status codes a gateway may answer a connection request with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnResStatus {
    /// Connection established
    Ok,
    /// Gateway does not support the requested connection type
    UnsupportedType,
    /// Gateway does not support one of the requested options
    UnsupportedOption,
    /// No more free channels on the gateway
    Busy,
    /// Any other non-zero status
    Other(u8),
}

impl ConnResStatus {
    pub const fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Ok,
            0x22 => Self::UnsupportedType,
            0x23 => Self::UnsupportedOption,
            0x24 => Self::Busy,
            other => Self::Other(other),
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::UnsupportedType => 0x22,
            Self::UnsupportedOption => 0x23,
            Self::Busy => 0x24,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ConnResStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("connection established"),
            Self::UnsupportedType => f.write_str("connection type not supported"),
            Self::UnsupportedOption => f.write_str("connection option not supported"),
            Self::Busy => f.write_str("no more connections available"),
            Self::Other(code) => write!(f, "status {code:#04x}"),
        }
    }
}

/// Connection state reported in a CONNECTIONSTATE_RESPONSE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Connection is alive
    Normal,
    /// Gateway no longer knows the channel
    Inactive,
    /// Gateway detected an error on the data connection
    DataConnectionError,
    /// Gateway detected an error on the KNX side
    KnxConnectionError,
    /// Any other non-zero state
    Other(u8),
}

impl ConnState {
    pub const fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Normal,
            0x21 => Self::Inactive,
            0x26 => Self::DataConnectionError,
            0x27 => Self::KnxConnectionError,
            other => Self::Other(other),
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            Self::Normal => 0x00,
            Self::Inactive => 0x21,
            Self::DataConnectionError => 0x26,
            Self::KnxConnectionError => 0x27,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Inactive => f.write_str("inactive"),
            Self::DataConnectionError => f.write_str("data connection error"),
            Self::KnxConnectionError => f.write_str("knx connection error"),
            Self::Other(code) => write!(f, "state {code:#04x}"),
        }
    }
}

/// CONNECT_REQUEST: open a tunnel, registering where replies go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub control: HostInfo,
    pub data: HostInfo,
}

/// CONNECT_RESPONSE: the gateway's verdict plus the assigned channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionResponse {
    /// Assigned channel, 0 when the request was refused
    pub channel: u8,
    pub status: ConnResStatus,
    /// Echo of the endpoint the gateway will talk to
    pub control: HostInfo,
}

/// CONNECTIONSTATE_REQUEST: heartbeat poll for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStateRequest {
    pub channel: u8,
    pub status: u8,
    pub control: HostInfo,
}

/// CONNECTIONSTATE_RESPONSE: the gateway's view of the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStateResponse {
    pub channel: u8,
    pub state: ConnState,
}

/// DISCONNECT_REQUEST: tear down a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectRequest {
    pub channel: u8,
    pub status: u8,
    pub control: HostInfo,
}

/// DISCONNECT_RESPONSE: teardown confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectResponse {
    pub channel: u8,
    pub status: u8,
}

/// TUNNELING_REQUEST: one CEMI frame, flowing in either direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    pub channel: u8,
    pub seq_number: u8,
    /// Opaque CEMI payload
    pub data: Bytes,
}

/// TUNNELING_ACK: acknowledges one tunneling request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelResponse {
    pub channel: u8,
    pub seq_number: u8,
    pub status: u8,
}

/// A decoded KNXnet/IP frame
///
/// The transport yields these in arrival order; the client dispatcher
/// pattern-matches on the variant to route them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    ConnectionRequest(ConnectionRequest),
    ConnectionResponse(ConnectionResponse),
    ConnectionStateRequest(ConnectionStateRequest),
    ConnectionStateResponse(ConnectionStateResponse),
    DisconnectRequest(DisconnectRequest),
    DisconnectResponse(DisconnectResponse),
    TunnelRequest(TunnelRequest),
    TunnelResponse(TunnelResponse),
}

impl Message {
    /// Short name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionRequest(_) => "connect request",
            Self::ConnectionResponse(_) => "connect response",
            Self::ConnectionStateRequest(_) => "connection state request",
            Self::ConnectionStateResponse(_) => "connection state response",
            Self::DisconnectRequest(_) => "disconnect request",
            Self::DisconnectResponse(_) => "disconnect response",
            Self::TunnelRequest(_) => "tunneling request",
            Self::TunnelResponse(_) => "tunneling ack",
        }
    }
}

//! Byte-level codec for KNXnet/IP frames
//!
//! Frame layout:
//! ```text
//! +--------+--------+--------+--------+--------+--------+
//! | 0x06   | 0x10   |   Service ID    |  Total Length   |
//! +--------+--------+--------+--------+--------+--------+
//! |                    Service Body                      |
//! +------------------------------------------------------+
//! ```
//!
//! All multi-byte integers are big endian. Endpoints travel as HPAI
//! structures (`08 01 <ip4> <port>`), tunneling frames carry a
//! four-byte connection header in front of the CEMI payload.

use super::message::*;
use super::{
    ProtocolError, HEADER_SIZE, IPV4_UDP, MAX_FRAME_SIZE, PROTOCOL_VERSION,
    SERVICE_CONNECTIONSTATE_REQUEST, SERVICE_CONNECTIONSTATE_RESPONSE, SERVICE_CONNECT_REQUEST,
    SERVICE_CONNECT_RESPONSE, SERVICE_DISCONNECT_REQUEST, SERVICE_DISCONNECT_RESPONSE,
    SERVICE_TUNNELING_ACK, SERVICE_TUNNELING_REQUEST, TUNNEL_CONNECTION, TUNNEL_LINK_LAYER,
};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;

/// Size of an encoded HPAI structure
const HPAI_SIZE: usize = 8;

/// Size of the connection header on tunneling frames
const CONN_HEADER_SIZE: usize = 4;

/// Encode a message into a ready-to-send datagram
pub fn encode(msg: &Message) -> Result<BytesMut, ProtocolError> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + 26);

    // Header; total length is patched once the body is in place.
    buf.put_u8(HEADER_SIZE as u8);
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_u16(service_of(msg));
    buf.put_u16(0);

    match msg {
        Message::ConnectionRequest(req) => {
            put_hpai(&mut buf, req.control);
            put_hpai(&mut buf, req.data);
            // CRI: tunnel connection on the link layer
            buf.put_u8(4);
            buf.put_u8(TUNNEL_CONNECTION);
            buf.put_u8(TUNNEL_LINK_LAYER);
            buf.put_u8(0);
        }
        Message::ConnectionResponse(res) => {
            buf.put_u8(res.channel);
            buf.put_u8(res.status.code());
            put_hpai(&mut buf, res.control);
            // CRD: connection type, unknown host address
            buf.put_u8(4);
            buf.put_u8(TUNNEL_CONNECTION);
            buf.put_u16(0);
        }
        Message::ConnectionStateRequest(req) => {
            buf.put_u8(req.channel);
            buf.put_u8(req.status);
            put_hpai(&mut buf, req.control);
        }
        Message::ConnectionStateResponse(res) => {
            buf.put_u8(res.channel);
            buf.put_u8(res.state.code());
        }
        Message::DisconnectRequest(req) => {
            buf.put_u8(req.channel);
            buf.put_u8(req.status);
            put_hpai(&mut buf, req.control);
        }
        Message::DisconnectResponse(res) => {
            buf.put_u8(res.channel);
            buf.put_u8(res.status);
        }
        Message::TunnelRequest(req) => {
            buf.put_u8(CONN_HEADER_SIZE as u8);
            buf.put_u8(req.channel);
            buf.put_u8(req.seq_number);
            buf.put_u8(0);
            buf.put_slice(&req.data);
        }
        Message::TunnelResponse(res) => {
            buf.put_u8(CONN_HEADER_SIZE as u8);
            buf.put_u8(res.channel);
            buf.put_u8(res.seq_number);
            buf.put_u8(res.status);
        }
    }

    let total = buf.len();
    if total > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(total));
    }
    buf[4..6].copy_from_slice(&(total as u16).to_be_bytes());

    Ok(buf)
}

/// Decode one datagram into a message
pub fn decode(datagram: &[u8]) -> Result<Message, ProtocolError> {
    if datagram.len() < HEADER_SIZE {
        return Err(ProtocolError::UnexpectedEnd);
    }
    if datagram[0] as usize != HEADER_SIZE {
        return Err(ProtocolError::Malformed("header length"));
    }
    if datagram[1] != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(datagram[1]));
    }

    let service = u16::from_be_bytes([datagram[2], datagram[3]]);
    let total = u16::from_be_bytes([datagram[4], datagram[5]]) as usize;
    if total > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(total));
    }
    if total < HEADER_SIZE || total > datagram.len() {
        return Err(ProtocolError::UnexpectedEnd);
    }

    let body = &datagram[HEADER_SIZE..total];

    match service {
        SERVICE_CONNECT_REQUEST => {
            let control = get_hpai(body)?;
            let data = get_hpai(&body[HPAI_SIZE..])?;
            Ok(Message::ConnectionRequest(ConnectionRequest { control, data }))
        }
        SERVICE_CONNECT_RESPONSE => {
            if body.len() < 2 {
                return Err(ProtocolError::UnexpectedEnd);
            }
            let channel = body[0];
            let status = ConnResStatus::from_code(body[1]);
            // Refusals may omit the endpoint.
            let control = if body.len() >= 2 + HPAI_SIZE {
                get_hpai(&body[2..])?
            } else {
                HostInfo::UNSPECIFIED
            };
            Ok(Message::ConnectionResponse(ConnectionResponse { channel, status, control }))
        }
        SERVICE_CONNECTIONSTATE_REQUEST => {
            if body.len() < 2 + HPAI_SIZE {
                return Err(ProtocolError::UnexpectedEnd);
            }
            Ok(Message::ConnectionStateRequest(ConnectionStateRequest {
                channel: body[0],
                status: body[1],
                control: get_hpai(&body[2..])?,
            }))
        }
        SERVICE_CONNECTIONSTATE_RESPONSE => {
            if body.len() < 2 {
                return Err(ProtocolError::UnexpectedEnd);
            }
            Ok(Message::ConnectionStateResponse(ConnectionStateResponse {
                channel: body[0],
                state: ConnState::from_code(body[1]),
            }))
        }
        SERVICE_DISCONNECT_REQUEST => {
            if body.len() < 2 + HPAI_SIZE {
                return Err(ProtocolError::UnexpectedEnd);
            }
            Ok(Message::DisconnectRequest(DisconnectRequest {
                channel: body[0],
                status: body[1],
                control: get_hpai(&body[2..])?,
            }))
        }
        SERVICE_DISCONNECT_RESPONSE => {
            if body.len() < 2 {
                return Err(ProtocolError::UnexpectedEnd);
            }
            Ok(Message::DisconnectResponse(DisconnectResponse {
                channel: body[0],
                status: body[1],
            }))
        }
        SERVICE_TUNNELING_REQUEST => {
            let (channel, seq_number, _) = get_conn_header(body)?;
            Ok(Message::TunnelRequest(TunnelRequest {
                channel,
                seq_number,
                data: Bytes::copy_from_slice(&body[CONN_HEADER_SIZE..]),
            }))
        }
        SERVICE_TUNNELING_ACK => {
            let (channel, seq_number, status) = get_conn_header(body)?;
            Ok(Message::TunnelResponse(TunnelResponse { channel, seq_number, status }))
        }
        unknown => Err(ProtocolError::UnknownService(unknown)),
    }
}

fn service_of(msg: &Message) -> u16 {
    match msg {
        Message::ConnectionRequest(_) => SERVICE_CONNECT_REQUEST,
        Message::ConnectionResponse(_) => SERVICE_CONNECT_RESPONSE,
        Message::ConnectionStateRequest(_) => SERVICE_CONNECTIONSTATE_REQUEST,
        Message::ConnectionStateResponse(_) => SERVICE_CONNECTIONSTATE_RESPONSE,
        Message::DisconnectRequest(_) => SERVICE_DISCONNECT_REQUEST,
        Message::DisconnectResponse(_) => SERVICE_DISCONNECT_RESPONSE,
        Message::TunnelRequest(_) => SERVICE_TUNNELING_REQUEST,
        Message::TunnelResponse(_) => SERVICE_TUNNELING_ACK,
    }
}

fn put_hpai(buf: &mut BytesMut, host: HostInfo) {
    buf.put_u8(HPAI_SIZE as u8);
    buf.put_u8(IPV4_UDP);
    buf.put_slice(&host.address.octets());
    buf.put_u16(host.port);
}

fn get_hpai(data: &[u8]) -> Result<HostInfo, ProtocolError> {
    if data.len() < HPAI_SIZE {
        return Err(ProtocolError::UnexpectedEnd);
    }
    if data[0] as usize != HPAI_SIZE {
        return Err(ProtocolError::Malformed("endpoint length"));
    }
    if data[1] != IPV4_UDP {
        return Err(ProtocolError::Malformed("host protocol"));
    }

    Ok(HostInfo {
        address: Ipv4Addr::new(data[2], data[3], data[4], data[5]),
        port: u16::from_be_bytes([data[6], data[7]]),
    })
}

fn get_conn_header(body: &[u8]) -> Result<(u8, u8, u8), ProtocolError> {
    if body.len() < CONN_HEADER_SIZE {
        return Err(ProtocolError::UnexpectedEnd);
    }
    if body[0] as usize != CONN_HEADER_SIZE {
        return Err(ProtocolError::Malformed("connection header length"));
    }

    Ok((body[1], body[2], body[3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostInfo {
        HostInfo::new(Ipv4Addr::new(192, 168, 1, 20), 50123)
    }

    #[test]
    fn test_encode_connection_request() {
        let msg = Message::ConnectionRequest(ConnectionRequest { control: host(), data: host() });
        let buf = encode(&msg).unwrap();

        assert_eq!(buf.len(), 26);
        // Header
        assert_eq!(&buf[..6], &[0x06, 0x10, 0x02, 0x05, 0x00, 0x1A]);
        // Control HPAI
        assert_eq!(&buf[6..14], &[0x08, 0x01, 192, 168, 1, 20, 0xC3, 0xCB]);
        // CRI
        assert_eq!(&buf[22..26], &[0x04, 0x04, 0x02, 0x00]);
    }

    #[test]
    fn test_decode_connection_response() {
        let mut raw = vec![0x06, 0x10, 0x02, 0x06, 0x00, 0x14];
        raw.extend_from_slice(&[0x01, 0x00]); // channel 1, status ok
        raw.extend_from_slice(&[0x08, 0x01, 192, 168, 1, 20, 0xC3, 0xCB]);
        raw.extend_from_slice(&[0x04, 0x04, 0x11, 0x0A]); // CRD

        let msg = decode(&raw).unwrap();
        assert_eq!(
            msg,
            Message::ConnectionResponse(ConnectionResponse {
                channel: 1,
                status: ConnResStatus::Ok,
                control: host(),
            })
        );
    }

    #[test]
    fn test_decode_refused_connection_response_without_endpoint() {
        // A busy gateway may answer with channel and status only.
        let raw = vec![0x06, 0x10, 0x02, 0x06, 0x00, 0x08, 0x00, 0x24];

        let msg = decode(&raw).unwrap();
        assert_eq!(
            msg,
            Message::ConnectionResponse(ConnectionResponse {
                channel: 0,
                status: ConnResStatus::Busy,
                control: HostInfo::UNSPECIFIED,
            })
        );
    }

    #[test]
    fn test_tunnel_request_roundtrip() {
        let msg = Message::TunnelRequest(TunnelRequest {
            channel: 3,
            seq_number: 250,
            data: Bytes::from_static(&[0x29, 0x00, 0xBC, 0xE0]),
        });

        let buf = encode(&msg).unwrap();
        assert_eq!(&buf[..6], &[0x06, 0x10, 0x04, 0x20, 0x00, 0x0E]);
        assert_eq!(&buf[6..10], &[0x04, 0x03, 250, 0x00]);

        assert_eq!(decode(&buf).unwrap(), msg);
    }

    #[test]
    fn test_tunnel_ack_bytes() {
        let msg = Message::TunnelResponse(TunnelResponse { channel: 1, seq_number: 7, status: 0 });
        let buf = encode(&msg).unwrap();

        assert_eq!(&buf[..], &[0x06, 0x10, 0x04, 0x21, 0x00, 0x0A, 0x04, 0x01, 0x07, 0x00]);
    }

    #[test]
    fn test_connection_state_roundtrip() {
        let req = Message::ConnectionStateRequest(ConnectionStateRequest {
            channel: 1,
            status: 0,
            control: host(),
        });
        assert_eq!(decode(&encode(&req).unwrap()).unwrap(), req);

        let res = Message::ConnectionStateResponse(ConnectionStateResponse {
            channel: 1,
            state: ConnState::Inactive,
        });
        let buf = encode(&res).unwrap();
        assert_eq!(&buf[..], &[0x06, 0x10, 0x02, 0x08, 0x00, 0x08, 0x01, 0x21]);
        assert_eq!(decode(&buf).unwrap(), res);
    }

    #[test]
    fn test_decode_truncated_frame() {
        assert!(matches!(decode(&[0x06, 0x10, 0x02]), Err(ProtocolError::UnexpectedEnd)));

        // Header announces more bytes than the datagram carries.
        let raw = vec![0x06, 0x10, 0x02, 0x06, 0x00, 0x14, 0x01, 0x00];
        assert!(matches!(decode(&raw), Err(ProtocolError::UnexpectedEnd)));
    }

    #[test]
    fn test_decode_bad_version() {
        let raw = vec![0x06, 0x20, 0x02, 0x06, 0x00, 0x08, 0x01, 0x00];
        assert!(matches!(decode(&raw), Err(ProtocolError::UnsupportedVersion(0x20))));
    }

    #[test]
    fn test_decode_unknown_service() {
        let raw = vec![0x06, 0x10, 0x05, 0x30, 0x00, 0x06];
        assert!(matches!(decode(&raw), Err(ProtocolError::UnknownService(0x0530))));
    }
}

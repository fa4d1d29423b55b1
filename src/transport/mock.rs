//! In-memory gateway socket for tests
//!
//! [`MockSocket::pair`] returns the client-side socket together with a
//! [`MockGateway`] holding the other end of both queues, so a test can
//! play the gateway: inspect what the client sent and push responses
//! into the client's inbound stream. Both halves of the socket close
//! independently, mirroring the real transport.

use super::{GatewaySocket, TransportError};
use crate::protocol::{HostInfo, Message};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Client side of an in-memory socket pair
pub struct MockSocket {
    to_gateway: StdMutex<Option<mpsc::UnboundedSender<Message>>>,
    from_gateway: Mutex<mpsc::UnboundedReceiver<Message>>,
    in_closed: CancellationToken,
    local: HostInfo,
}

/// Test-side counterpart of a [`MockSocket`]
pub struct MockGateway {
    from_client: mpsc::UnboundedReceiver<Message>,
    to_client: mpsc::UnboundedSender<Message>,
}

impl MockSocket {
    /// Create a connected socket/gateway pair
    pub fn pair() -> (MockSocket, MockGateway) {
        let (to_gateway, from_client) = mpsc::unbounded_channel();
        let (to_client, from_gateway) = mpsc::unbounded_channel();

        let socket = MockSocket {
            to_gateway: StdMutex::new(Some(to_gateway)),
            from_gateway: Mutex::new(from_gateway),
            in_closed: CancellationToken::new(),
            local: HostInfo::new(Ipv4Addr::LOCALHOST, 3671),
        };

        (socket, MockGateway { from_client, to_client })
    }
}

#[async_trait]
impl GatewaySocket for MockSocket {
    async fn send(&self, msg: Message) -> Result<(), TransportError> {
        let guard = self.to_gateway.lock().expect("send lock poisoned");
        match guard.as_ref() {
            Some(tx) => tx.send(msg).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    async fn recv(&self) -> Result<Message, TransportError> {
        let mut inbound = self.from_gateway.lock().await;
        tokio::select! {
            biased;
            _ = self.in_closed.cancelled() => Err(TransportError::Closed),
            msg = inbound.recv() => msg.ok_or(TransportError::Closed),
        }
    }

    fn local_host_info(&self) -> HostInfo {
        self.local
    }

    fn close_in(&self) {
        self.in_closed.cancel();
    }

    fn close_out(&self) {
        self.to_gateway.lock().expect("send lock poisoned").take();
    }
}

impl MockGateway {
    /// Wait for the next message the client sent
    ///
    /// Panics when the client has closed its outbound half; tests that
    /// expect closure should use [`MockGateway::try_receive`].
    pub async fn receive(&mut self) -> Message {
        self.from_client.recv().await.expect("client closed its outbound half")
    }

    /// Receive and discard one message
    pub async fn ignore(&mut self) {
        let _ = self.from_client.recv().await;
    }

    /// Pop an already-delivered message without waiting
    pub fn try_receive(&mut self) -> Option<Message> {
        self.from_client.try_recv().ok()
    }

    /// Push a message into the client's inbound stream
    pub fn send(&self, msg: Message) {
        let _ = self.to_client.send(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DisconnectResponse;

    fn probe() -> Message {
        Message::DisconnectResponse(DisconnectResponse { channel: 1, status: 0 })
    }

    #[tokio::test]
    async fn test_mock_socket_duplex() {
        let (sock, mut gw) = MockSocket::pair();

        sock.send(probe()).await.unwrap();
        assert_eq!(gw.receive().await, probe());

        gw.send(probe());
        assert_eq!(sock.recv().await.unwrap(), probe());
    }

    #[tokio::test]
    async fn test_mock_socket_closed_halves() {
        let (sock, mut gw) = MockSocket::pair();

        sock.close_out();
        assert!(matches!(sock.send(probe()).await, Err(TransportError::Closed)));
        assert!(gw.try_receive().is_none());

        sock.close_in();
        gw.send(probe());
        assert!(matches!(sock.recv().await, Err(TransportError::Closed)));
    }
}

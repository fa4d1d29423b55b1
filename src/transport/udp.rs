//! UDP transport to a KNXnet/IP gateway

use super::{GatewaySocket, TransportError};
use crate::protocol::{self, HostInfo, Message, MAX_FRAME_SIZE};
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{self, UdpSocket};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Inbound messages buffered between the reader task and the consumer
const INBOUND_BUFFER: usize = 64;

/// A UDP socket connected to one gateway
///
/// A spawned reader task decodes every datagram the gateway sends and
/// feeds it into the inbound queue; datagrams that do not parse are
/// logged and dropped.
pub struct UdpGatewaySocket {
    socket: Arc<UdpSocket>,
    inbound: Mutex<mpsc::Receiver<Message>>,
    reader: JoinHandle<()>,
    out_closed: AtomicBool,
    local: HostInfo,
}

impl UdpGatewaySocket {
    /// Bind an ephemeral local port and connect it to the gateway
    pub async fn connect(gateway: impl net::ToSocketAddrs) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect(gateway).await?;

        let local = match socket.local_addr()? {
            SocketAddr::V4(addr) => HostInfo::new(*addr.ip(), addr.port()),
            SocketAddr::V6(_) => {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "tunneling requires an IPv4 endpoint",
                )))
            }
        };

        let socket = Arc::new(socket);
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let reader = tokio::spawn(read_datagrams(Arc::clone(&socket), tx));

        debug!(%local, "gateway socket bound");

        Ok(Self {
            socket,
            inbound: Mutex::new(rx),
            reader,
            out_closed: AtomicBool::new(false),
            local,
        })
    }
}

async fn read_datagrams(socket: Arc<UdpSocket>, tx: mpsc::Sender<Message>) {
    let mut buf = [0u8; MAX_FRAME_SIZE];
    loop {
        let len = match socket.recv(&mut buf).await {
            Ok(len) => len,
            Err(err) => {
                debug!(%err, "gateway socket read failed");
                break;
            }
        };

        match protocol::decode(&buf[..len]) {
            Ok(msg) => {
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(err) => warn!(%err, len, "dropping undecodable datagram"),
        }
    }
}

#[async_trait]
impl GatewaySocket for UdpGatewaySocket {
    async fn send(&self, msg: Message) -> Result<(), TransportError> {
        if self.out_closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let buf = protocol::encode(&msg)?;
        self.socket.send(&buf).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Message, TransportError> {
        self.inbound.lock().await.recv().await.ok_or(TransportError::Closed)
    }

    fn local_host_info(&self) -> HostInfo {
        self.local
    }

    fn close_in(&self) {
        self.reader.abort();
    }

    fn close_out(&self) {
        self.out_closed.store(true, Ordering::Release);
    }
}

impl Drop for UdpGatewaySocket {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

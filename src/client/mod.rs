//! Client layer
//!
//! Drives one tunneling connection end to end: the connection handshake,
//! a dispatcher reading every message the gateway sends, the periodic
//! connection state poll and the serialized outbound send path. The
//! application talks to all of it through [`Tunnel`].

mod handle;
mod resend;

use crate::config::ClientConfig;
use crate::protocol::{
    ConnState, ConnResStatus, DisconnectResponse, Message, TunnelResponse,
};
use crate::transport::{GatewaySocket, TransportError, UdpGatewaySocket};
use bytes::Bytes;
use handle::ConnHandle;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::ToSocketAddrs;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// CEMI frames buffered between the dispatcher and the application
const INBOUND_QUEUE: usize = 64;

/// Client layer errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Request timed out")]
    Timeout,

    #[error("Could not send request: {0}")]
    Send(#[source] TransportError),

    #[error("Resend failed: {0}")]
    Resend(#[source] TransportError),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Gateway refused the connection: {0}")]
    Connect(ConnResStatus),

    #[error("Gateway reports connection state: {0}")]
    ConnState(ConnState),

    #[error("Gateway refused the frame with status {0:#04x}")]
    Ack(u8),

    #[error("Tunneling request for channel {got}, connection uses {expected}")]
    InvalidChannel { expected: u8, got: u8 },

    #[error("Gateway closed the connection")]
    Disconnected,

    #[error("Connection is closed")]
    Closed,
}

/// One queued outbound frame, answered once acknowledged
struct SendCommand {
    data: Bytes,
    done: oneshot::Sender<Result<(), ClientError>>,
}

/// An established tunneling connection
///
/// Created with [`Tunnel::connect`]. CEMI frames from the bus arrive
/// through [`Tunnel::recv`] in the order the gateway delivered them;
/// [`Tunnel::send`] hands one frame to the gateway reliably. Dropping
/// the handle winds the connection down, [`Tunnel::close`] does so
/// observably.
#[derive(Debug)]
pub struct Tunnel {
    channel: u8,
    inbound_rx: mpsc::Receiver<Bytes>,
    cmd_tx: mpsc::Sender<SendCommand>,
    cancel: CancellationToken,
    driver: JoinHandle<Result<(), ClientError>>,
}

impl Tunnel {
    /// Connect to a gateway over UDP
    pub async fn connect(
        gateway: impl ToSocketAddrs,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let sock = UdpGatewaySocket::connect(gateway).await?;
        Self::with_socket(sock, config).await
    }

    /// Connect through an already-built transport
    pub async fn with_socket<S: GatewaySocket + 'static>(
        sock: S,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let config = config.sanitized();
        let cancel = CancellationToken::new();
        let mut handle = ConnHandle::new(Arc::new(sock), config.clone());

        match time::timeout(config.connection_timeout, handle.request_connection(&cancel)).await {
            Ok(result) => result?,
            Err(_) => return Err(ClientError::Timeout),
        }

        let channel = handle.channel;
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let (cmd_tx, cmd_rx) = mpsc::channel(1);

        let driver = tokio::spawn(drive(handle, cancel.clone(), inbound_tx, cmd_rx));

        Ok(Self { channel, inbound_rx, cmd_tx, cancel, driver })
    }

    /// The channel the gateway assigned to this connection
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Next CEMI frame from the bus
    ///
    /// Returns `None` once the connection is torn down; the reason is
    /// reported by [`Tunnel::close`].
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inbound_rx.recv().await
    }

    /// Send one CEMI frame, waiting for the gateway's acknowledgement
    ///
    /// Sends are serialized; concurrent callers queue up.
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<(), ClientError> {
        let (done, done_rx) = oneshot::channel();
        let cmd = SendCommand { data: data.into(), done };

        self.cmd_tx.send(cmd).await.map_err(|_| ClientError::Closed)?;
        done_rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Disconnect from the gateway
    ///
    /// Reports the error that ended the connection if it was already
    /// down.
    pub async fn close(self) -> Result<(), ClientError> {
        self.cancel.cancel();
        self.driver.await.unwrap_or(Err(ClientError::Closed))
    }
}

/// Run the connection until it fails or the application closes it, then
/// tear it down.
async fn drive<S: GatewaySocket>(
    handle: ConnHandle<S>,
    cancel: CancellationToken,
    inbound_tx: mpsc::Sender<Bytes>,
    cmd_rx: mpsc::Receiver<SendCommand>,
) -> Result<(), ClientError> {
    let (heartbeat_tx, heartbeat_rx) = mpsc::unbounded_channel();
    let (ack_tx, ack_rx) = mpsc::unbounded_channel();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(()),
        res = dispatch(&handle, &cancel, &inbound_tx, &heartbeat_tx, &ack_tx) => res,
        res = poll_gateway(&handle, &cancel, heartbeat_rx) => res,
        res = serve_sends(handle.clone(), &cancel, cmd_rx, ack_rx) => res,
    };

    match &result {
        // The channel is already gone on the gateway, or the transport
        // cannot carry a disconnect exchange anymore.
        Err(ClientError::Disconnected) | Err(ClientError::TransportClosed) => {}
        _ => {
            let teardown = CancellationToken::new();
            let disconnect = handle.request_disconnect(&teardown);
            match time::timeout(handle.config.connection_timeout, disconnect).await {
                Ok(Ok(())) => debug!("gateway confirmed the disconnect"),
                Ok(Err(err)) => debug!(%err, "disconnect exchange failed"),
                Err(_) => debug!("gateway did not confirm the disconnect in time"),
            }
        }
    }

    handle.sock.close();
    info!(channel = handle.channel, "tunnel connection closed");
    result
}

/// Sole reader of the transport: routes every inbound message to the
/// party waiting for it and owns the inbound sequence counter.
async fn dispatch<S: GatewaySocket>(
    handle: &ConnHandle<S>,
    cancel: &CancellationToken,
    inbound_tx: &mpsc::Sender<Bytes>,
    heartbeat_tx: &mpsc::UnboundedSender<ConnState>,
    ack_tx: &mpsc::UnboundedSender<TunnelResponse>,
) -> Result<(), ClientError> {
    let mut recv_seq: u8 = 0;

    loop {
        let msg = match handle.sock.recv().await {
            Ok(msg) => msg,
            Err(_) => return Err(ClientError::TransportClosed),
        };

        match msg {
            Message::TunnelRequest(req) => {
                match handle.handle_tunnel_request(cancel, &req, &mut recv_seq, inbound_tx).await {
                    Ok(()) => {}
                    Err(ClientError::InvalidChannel { expected, got }) => {
                        warn!(expected, got, "dropping tunneling request for foreign channel");
                    }
                    Err(err) => return Err(err),
                }
            }
            Message::ConnectionStateResponse(res) if res.channel == handle.channel => {
                let _ = heartbeat_tx.send(res.state);
            }
            Message::TunnelResponse(res) => {
                let _ = ack_tx.send(res);
            }
            Message::DisconnectRequest(req) if req.channel == handle.channel => {
                info!("gateway asked to disconnect");
                let res = Message::DisconnectResponse(DisconnectResponse {
                    channel: handle.channel,
                    status: 0,
                });
                let _ = handle.sock.send(res).await;
                return Err(ClientError::Disconnected);
            }
            other => trace!(kind = other.kind(), "dropping unexpected message"),
        }
    }
}

/// Poll the gateway's connection state on the heartbeat cadence; any
/// failed poll ends the connection.
async fn poll_gateway<S: GatewaySocket>(
    handle: &ConnHandle<S>,
    cancel: &CancellationToken,
    mut heartbeat_rx: mpsc::UnboundedReceiver<ConnState>,
) -> Result<(), ClientError> {
    let mut ticker = time::interval(handle.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The connection was established a moment ago; skip the immediate
    // first tick.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let poll = handle.request_connection_state(cancel, &mut heartbeat_rx);
        match time::timeout(handle.config.response_timeout, poll).await {
            Ok(Ok(())) => trace!("gateway is alive"),
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(ClientError::Timeout),
        }
    }
}

/// Carry out queued outbound sends one at a time
async fn serve_sends<S: GatewaySocket>(
    mut handle: ConnHandle<S>,
    cancel: &CancellationToken,
    mut cmd_rx: mpsc::Receiver<SendCommand>,
    mut ack_rx: mpsc::UnboundedReceiver<TunnelResponse>,
) -> Result<(), ClientError> {
    while let Some(cmd) = cmd_rx.recv().await {
        let response_timeout = handle.config.response_timeout;
        let send = handle.request_tunnel(cancel, cmd.data, &mut ack_rx);
        let result = match time::timeout(response_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        };

        let _ = cmd.done.send(result);
    }

    // Application dropped its handle; wind the connection down.
    Ok(())
}

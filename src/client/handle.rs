//! Per-connection state and the control-plane exchanges
//!
//! [`ConnHandle`] owns the socket for the lifetime of one tunneling
//! connection and carries the channel the gateway assigned plus the
//! outbound sequence counter. At most one control-plane exchange runs
//! per handle at a time; the driver in `client::mod` upholds that.

use super::resend::{resend_until, SocketInbound, Verdict};
use super::ClientError;
use crate::config::ClientConfig;
use crate::protocol::{
    ConnState, ConnResStatus, ConnectionRequest, ConnectionStateRequest, DisconnectRequest,
    Message, TunnelRequest, TunnelResponse,
};
use crate::transport::GatewaySocket;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// State of one tunneling connection
pub(crate) struct ConnHandle<S: GatewaySocket> {
    pub(crate) sock: Arc<S>,
    pub(crate) config: ClientConfig,
    /// Channel assigned by the gateway; 0 until the handshake succeeds
    pub(crate) channel: u8,
    /// Sequence number of the next outbound tunneling request
    pub(crate) send_seq: u8,
}

impl<S: GatewaySocket> Clone for ConnHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sock: Arc::clone(&self.sock),
            config: self.config.clone(),
            channel: self.channel,
            send_seq: self.send_seq,
        }
    }
}

impl<S: GatewaySocket> ConnHandle<S> {
    pub(crate) fn new(sock: Arc<S>, config: ClientConfig) -> Self {
        Self { sock, config, channel: 0, send_seq: 0 }
    }

    /// Perform the connection handshake and record the assigned channel.
    ///
    /// A busy gateway is retried on the resend cadence until it answers
    /// differently; every other refusal is terminal.
    pub(crate) async fn request_connection(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let control = self.sock.local_host_info();
        let req = Message::ConnectionRequest(ConnectionRequest { control, data: control });

        let mut inbound = SocketInbound(&*self.sock);
        let channel = resend_until(
            &*self.sock,
            req,
            self.config.resend_interval,
            cancel,
            &mut inbound,
            |msg| match msg {
                Message::ConnectionResponse(res) if res.control == control => match res.status {
                    ConnResStatus::Ok => Verdict::Accept(res.channel),
                    ConnResStatus::Busy => {
                        debug!("gateway is busy, keeping at it");
                        Verdict::Ignore
                    }
                    status => Verdict::Reject(ClientError::Connect(status)),
                },
                _ => Verdict::Ignore,
            },
        )
        .await?;

        self.channel = channel;
        info!(channel, "tunnel connection established");
        Ok(())
    }

    /// Poll the gateway's view of this channel once.
    ///
    /// `heartbeat` carries the states the dispatcher demultiplexed for
    /// this channel; the first one decides the outcome.
    pub(crate) async fn request_connection_state(
        &self,
        cancel: &CancellationToken,
        heartbeat: &mut mpsc::UnboundedReceiver<ConnState>,
    ) -> Result<(), ClientError> {
        let req = Message::ConnectionStateRequest(ConnectionStateRequest {
            channel: self.channel,
            status: 0,
            control: self.sock.local_host_info(),
        });

        resend_until(
            &*self.sock,
            req,
            self.config.resend_interval,
            cancel,
            heartbeat,
            |state| match state {
                ConnState::Normal => Verdict::Accept(()),
                state => Verdict::Reject(ClientError::ConnState(state)),
            },
        )
        .await
    }

    /// React to one tunneling request from the gateway.
    ///
    /// A request for another channel is an error and goes unanswered.
    /// Everything else is acknowledged with the sequence number it
    /// carried; only the request matching `seq` advances the counter
    /// and reaches the inbound queue. Delivery may wait for the
    /// application and is interruptible through `cancel`.
    pub(crate) async fn handle_tunnel_request(
        &self,
        cancel: &CancellationToken,
        req: &TunnelRequest,
        seq: &mut u8,
        inbound: &mpsc::Sender<Bytes>,
    ) -> Result<(), ClientError> {
        if req.channel != self.channel {
            return Err(ClientError::InvalidChannel {
                expected: self.channel,
                got: req.channel,
            });
        }

        let ack = Message::TunnelResponse(TunnelResponse {
            channel: self.channel,
            seq_number: req.seq_number,
            status: 0,
        });
        self.sock.send(ack).await.map_err(ClientError::Send)?;

        if req.seq_number != *seq {
            debug!(
                got = req.seq_number,
                expected = *seq,
                "acknowledged stale tunneling request without delivering it"
            );
            return Ok(());
        }

        *seq = seq.wrapping_add(1);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            sent = inbound.send(req.data.clone()) => sent.map_err(|_| ClientError::Closed),
        }
    }

    /// Send one CEMI frame, resending until the gateway acknowledges
    /// the current outbound sequence number.
    pub(crate) async fn request_tunnel(
        &mut self,
        cancel: &CancellationToken,
        data: Bytes,
        acks: &mut mpsc::UnboundedReceiver<TunnelResponse>,
    ) -> Result<(), ClientError> {
        let req = Message::TunnelRequest(TunnelRequest {
            channel: self.channel,
            seq_number: self.send_seq,
            data,
        });

        let channel = self.channel;
        let seq_number = self.send_seq;
        let status = resend_until(
            &*self.sock,
            req,
            self.config.resend_interval,
            cancel,
            acks,
            |res| {
                if res.channel == channel && res.seq_number == seq_number {
                    Verdict::Accept(res.status)
                } else {
                    Verdict::Ignore
                }
            },
        )
        .await?;

        if status != 0 {
            return Err(ClientError::Ack(status));
        }

        self.send_seq = self.send_seq.wrapping_add(1);
        Ok(())
    }

    /// Tear the channel down, waiting for the gateway's confirmation.
    pub(crate) async fn request_disconnect(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let req = Message::DisconnectRequest(DisconnectRequest {
            channel: self.channel,
            status: 0,
            control: self.sock.local_host_info(),
        });

        let channel = self.channel;
        let mut inbound = SocketInbound(&*self.sock);
        resend_until(
            &*self.sock,
            req,
            self.config.resend_interval,
            cancel,
            &mut inbound,
            |msg| match msg {
                Message::DisconnectResponse(res) if res.channel == channel => Verdict::Accept(()),
                _ => Verdict::Ignore,
            },
        )
        .await
    }
}

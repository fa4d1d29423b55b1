//! Bounded resend loop shared by every control-plane exchange
//!
//! One request message is emitted immediately and then re-emitted on a
//! fixed cadence until the predicate accepts an inbound message, the
//! caller cancels, or the transport dies. The loop itself never gives
//! up; the caller bounds it with a deadline or the cancellation token.

use super::ClientError;
use crate::protocol::Message;
use crate::transport::GatewaySocket;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Outcome of inspecting one inbound message
pub(crate) enum Verdict<T> {
    /// Not the answer; keep waiting
    Ignore,
    /// The exchange is complete
    Accept(T),
    /// The answer is terminal failure
    Reject(ClientError),
}

/// Source of inbound messages a resend loop waits on
///
/// The connection handshake listens on the socket itself; the other
/// exchanges listen on per-kind queues fed by the dispatcher.
#[async_trait]
pub(crate) trait InboundStream: Send {
    type Item: Send;

    /// Next message, or `None` once the stream is closed
    async fn next(&mut self) -> Option<Self::Item>;
}

#[async_trait]
impl<T: Send> InboundStream for mpsc::Receiver<T> {
    type Item = T;

    async fn next(&mut self) -> Option<T> {
        self.recv().await
    }
}

#[async_trait]
impl<T: Send> InboundStream for mpsc::UnboundedReceiver<T> {
    type Item = T;

    async fn next(&mut self) -> Option<T> {
        self.recv().await
    }
}

/// Adapter exposing a socket's inbound side as an [`InboundStream`]
pub(crate) struct SocketInbound<'a, S: GatewaySocket + ?Sized>(pub &'a S);

#[async_trait]
impl<S: GatewaySocket + ?Sized> InboundStream for SocketInbound<'_, S> {
    type Item = Message;

    async fn next(&mut self) -> Option<Message> {
        self.0.recv().await.ok()
    }
}

/// Send `msg`, then resend it every `interval` until `check` accepts an
/// inbound message.
///
/// Fails when the initial send or a resend fails, when the caller's
/// token trips, or when the inbound stream closes.
pub(crate) async fn resend_until<S, I, T>(
    sock: &S,
    msg: Message,
    interval: Duration,
    cancel: &CancellationToken,
    inbound: &mut I,
    mut check: impl FnMut(I::Item) -> Verdict<T> + Send,
) -> Result<T, ClientError>
where
    S: GatewaySocket + ?Sized,
    I: InboundStream,
{
    sock.send(msg.clone()).await.map_err(ClientError::Send)?;

    let mut resend = time::interval(interval);
    resend.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the initial send already
    // happened above.
    resend.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                return Err(ClientError::Cancelled);
            }

            item = inbound.next() => match item {
                Some(item) => match check(item) {
                    Verdict::Accept(value) => return Ok(value),
                    Verdict::Reject(err) => return Err(err),
                    Verdict::Ignore => trace!("ignoring unrelated inbound message"),
                },
                None => return Err(ClientError::TransportClosed),
            },

            _ = resend.tick() => {
                debug!(kind = msg.kind(), "no answer yet, resending");
                sock.send(msg.clone()).await.map_err(ClientError::Resend)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DisconnectRequest, DisconnectResponse, HostInfo};
    use crate::transport::MockSocket;

    fn request() -> Message {
        Message::DisconnectRequest(DisconnectRequest {
            channel: 1,
            status: 0,
            control: HostInfo::UNSPECIFIED,
        })
    }

    #[tokio::test]
    async fn test_resends_until_accepted() {
        let (sock, mut gw) = MockSocket::pair();
        let cancel = CancellationToken::new();

        let client = async {
            let mut inbound = SocketInbound(&sock);
            resend_until(
                &sock,
                request(),
                Duration::from_millis(5),
                &cancel,
                &mut inbound,
                |msg| match msg {
                    Message::DisconnectResponse(res) => Verdict::Accept(res.status),
                    _ => Verdict::Ignore,
                },
            )
            .await
        };

        let gateway = async {
            // Let two copies of the request go unanswered before replying.
            gw.ignore().await;
            gw.ignore().await;
            gw.receive().await;
            gw.send(Message::DisconnectResponse(DisconnectResponse { channel: 1, status: 0 }));
        };

        let (result, ()) = tokio::join!(client, gateway);
        assert_eq!(result.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unrelated_messages_are_skipped() {
        let (sock, mut gw) = MockSocket::pair();
        let cancel = CancellationToken::new();

        gw.send(request()); // not a response, must be ignored
        gw.send(Message::DisconnectResponse(DisconnectResponse { channel: 1, status: 0 }));

        let mut inbound = SocketInbound(&sock);
        let result = resend_until(
            &sock,
            request(),
            Duration::from_secs(10),
            &cancel,
            &mut inbound,
            |msg| match msg {
                Message::DisconnectResponse(res) => Verdict::Accept(res.status),
                _ => Verdict::Ignore,
            },
        )
        .await;

        assert_eq!(result.unwrap(), 0);
        gw.ignore().await;
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_waiting() {
        let (sock, _gw) = MockSocket::pair();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut inbound = SocketInbound(&sock);
        let result = resend_until(
            &sock,
            request(),
            Duration::from_secs(10),
            &cancel,
            &mut inbound,
            |_: Message| Verdict::Accept(()),
        )
        .await;

        assert!(matches!(result, Err(ClientError::Cancelled)));
    }
}

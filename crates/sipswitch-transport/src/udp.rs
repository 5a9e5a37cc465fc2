//! The UDP listener (spec §4.2): one receive loop per bound address,
//! one datagram is one message, no framing needed.
//!
//! Grounded on `rvoip-sip-transport`'s `UdpTransport` (`bind` + cloneable
//! handle over an `Arc<Inner>` + `spawn_receive_loop`).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use sipswitch_core::{parser, serializer, SipMessage};

use crate::error::{Error, Result};
use crate::event::TransportEvent;
use crate::TransportKind;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;
/// Datagrams larger than this are, per spec §4.2, a candidate for TCP
/// retransmission by the caller rather than a hard UDP limit here.
pub const MTU_WARNING_THRESHOLD: usize = 1300;
const MAX_DATAGRAM_SIZE: usize = 65536;

#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<Inner>,
}

struct Inner {
    socket: Arc<UdpSocket>,
    closed: AtomicBool,
    events_tx: mpsc::Sender<TransportEvent>,
}

impl UdpTransport {
    pub async fn bind(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        info!(%local_addr, "UDP transport bound");

        let transport = UdpTransport {
            inner: Arc::new(Inner {
                socket: Arc::new(socket),
                closed: AtomicBool::new(false),
                events_tx,
            }),
        };
        transport.spawn_receive_loop();
        Ok((transport, events_rx))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.socket.local_addr()?)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Relaxed);
    }

    pub async fn send(&self, message: &SipMessage, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        let bytes = serializer::serialize(message);
        debug!(%destination, len = bytes.len(), "sending UDP datagram");
        self.inner
            .socket
            .send_to(&bytes, destination)
            .await
            .map_err(|_| Error::ConnectionRefused(destination))?;
        Ok(())
    }

    fn spawn_receive_loop(&self) {
        let transport = self.clone();
        tokio::spawn(async move {
            let inner = &transport.inner;
            let local_addr = match inner.socket.local_addr() {
                Ok(a) => a,
                Err(_) => return,
            };
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

            while !inner.closed.load(Ordering::Relaxed) {
                let (len, source) = match inner.socket.recv_from(&mut buf).await {
                    Ok(v) => v,
                    Err(e) => {
                        if inner.closed.load(Ordering::Relaxed) {
                            break;
                        }
                        error!(error = %e, "UDP receive error");
                        let _ = inner
                            .events_tx
                            .send(TransportEvent::Error { error: e.to_string() })
                            .await;
                        continue;
                    }
                };

                match parser::parse(&buf[..len]) {
                    Ok((message, _consumed)) => {
                        let event = TransportEvent::MessageReceived {
                            message,
                            source,
                            destination: local_addr,
                            transport: TransportKind::Udp,
                        };
                        if inner.events_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, %source, "failed to parse UDP datagram");
                        let _ = inner
                            .events_tx
                            .send(TransportEvent::Error { error: e.to_string() })
                            .await;
                    }
                }
            }

            let _ = inner.events_tx.send(TransportEvent::Closed).await;
            info!("UDP receive loop terminated");
        });
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.local_addr() {
            Ok(addr) => write!(f, "UdpTransport({})", addr),
            Err(_) => write!(f, "UdpTransport(<closed>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipswitch_core::{header::HeaderName, message::Request, method::Method, uri::Uri};
    use std::str::FromStr;

    fn sample_request() -> SipMessage {
        let mut req = Request::new(Method::Options, Uri::from_str("sip:bob@example.com").unwrap());
        req.headers.push(HeaderName::Via, "SIP/2.0/UDP a.example.com;branch=z9hG4bK1");
        req.headers.push(HeaderName::From, "<sip:alice@example.com>");
        req.headers.push(HeaderName::To, "<sip:bob@example.com>");
        req.headers.push(HeaderName::CallId, "abc");
        req.headers.push(HeaderName::CSeq, "1 OPTIONS");
        req.headers.push(HeaderName::MaxForwards, "70");
        SipMessage::Request(req)
    }

    #[tokio::test]
    async fn round_trips_a_datagram_between_two_sockets() {
        let (a, _a_events) = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), None)
            .await
            .unwrap();
        let (b, mut b_events) = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), None)
            .await
            .unwrap();

        let dest = b.local_addr().unwrap();
        a.send(&sample_request(), dest).await.unwrap();

        let event = b_events.recv().await.unwrap();
        match event {
            TransportEvent::MessageReceived { message, transport, .. } => {
                assert!(message.is_request());
                assert_eq!(transport, TransportKind::Udp);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

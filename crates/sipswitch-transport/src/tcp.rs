//! TCP accept loop, per-connection reader tasks, and the outbound
//! connection pool (spec §4.2).
//!
//! Framing is strict length-prefix-by-`Content-Length`: the reader buffers
//! until it sees a full header block (`\r\n\r\n`), reads `Content-Length`
//! more bytes for the body, dispatches, and repeats. No `Content-Length`
//! is always a parse error on this transport (`ParseError::MissingContentLength`
//! upstream maps to 400).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use sipswitch_core::{parser, serializer, SipMessage};

use crate::error::{Error, Result};
use crate::event::TransportEvent;
use crate::TransportKind;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_IDLE_WINDOW: Duration = Duration::from_secs(120);
const READ_CHUNK: usize = 4096;

struct PooledConnection {
    writer: Mutex<tokio::net::tcp::OwnedWriteHalf>,
    last_used: Mutex<Instant>,
}

/// Outbound connections indexed by remote address, reused for proxy
/// forwarding (spec §4.2 "connection pool").
pub struct TcpConnectionPool {
    connections: DashMap<SocketAddr, Arc<PooledConnection>>,
    events_tx: mpsc::Sender<TransportEvent>,
    idle_window: Duration,
    closed: AtomicBool,
}

impl TcpConnectionPool {
    pub fn new(events_tx: mpsc::Sender<TransportEvent>, idle_window: Option<Duration>) -> Arc<Self> {
        let pool = Arc::new(TcpConnectionPool {
            connections: DashMap::new(),
            events_tx,
            idle_window: idle_window.unwrap_or(DEFAULT_IDLE_WINDOW),
            closed: AtomicBool::new(false),
        });
        pool.clone().spawn_idle_sweeper();
        pool
    }

    pub async fn send(&self, message: &SipMessage, destination: SocketAddr) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::TransportClosed);
        }
        let bytes = serializer::serialize(message);
        let conn = self.connection_for(destination).await?;
        *conn.last_used.lock().await = Instant::now();
        let mut writer = conn.writer.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|_| Error::ConnectionClosed(destination))?;
        Ok(())
    }

    async fn connection_for(&self, destination: SocketAddr) -> Result<Arc<PooledConnection>> {
        if let Some(existing) = self.connections.get(&destination) {
            return Ok(existing.clone());
        }

        let stream = TcpStream::connect(destination)
            .await
            .map_err(|_| Error::ConnectionRefused(destination))?;
        let conn = self.adopt_connection(stream, destination);
        Ok(conn)
    }

    /// Wraps an accepted or outbound stream: spawns its reader task and
    /// registers the write half in the pool, keyed by the peer address.
    fn adopt_connection(&self, stream: TcpStream, peer: SocketAddr) -> Arc<PooledConnection> {
        let (read_half, write_half) = stream.into_split();
        let conn = Arc::new(PooledConnection {
            writer: Mutex::new(write_half),
            last_used: Mutex::new(Instant::now()),
        });
        self.connections.insert(peer, conn.clone());
        spawn_reader(read_half, peer, self.events_tx.clone());
        conn
    }

    fn spawn_idle_sweeper(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                if self.closed.load(Ordering::Relaxed) {
                    break;
                }
                let now = Instant::now();
                let mut stale = Vec::new();
                for entry in self.connections.iter() {
                    if now.duration_since(*entry.value().last_used.lock().await) > self.idle_window {
                        stale.push(*entry.key());
                    }
                }
                for addr in stale {
                    debug!(%addr, "closing idle TCP connection");
                    self.connections.remove(&addr);
                }
            }
        });
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.connections.clear();
    }
}

/// Accepts inbound TCP connections and registers each one in `pool` so the
/// proxy can reuse the same connection on the response path.
pub async fn accept_loop(
    listener: TcpListener,
    pool: Arc<TcpConnectionPool>,
    events_tx: mpsc::Sender<TransportEvent>,
) {
    let local_addr = listener.local_addr().ok();
    info!(?local_addr, "TCP accept loop started");
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted TCP connection");
                pool.adopt_connection(stream, peer);
            }
            Err(e) => {
                error!(error = %e, "TCP accept error");
                let _ = events_tx
                    .send(TransportEvent::Error { error: e.to_string() })
                    .await;
            }
        }
    }
}

fn spawn_reader(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    peer: SocketAddr,
    events_tx: mpsc::Sender<TransportEvent>,
) {
    tokio::spawn(async move {
        let local_addr = read_half.local_addr().ok();
        let mut buf: Vec<u8> = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match try_extract_message(&mut buf, peer, local_addr, &events_tx).await {
                ExtractOutcome::Dispatched => continue,
                ExtractOutcome::NeedMoreData => {}
                ExtractOutcome::FatalParseError => break,
            }

            let n = match read_half.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(%peer, error = %e, "TCP read error");
                    break;
                }
            };
            buf.extend_from_slice(&chunk[..n]);
        }

        let _ = events_tx.send(TransportEvent::Closed).await;
        debug!(%peer, "TCP reader task terminated");
    });
}

enum ExtractOutcome {
    Dispatched,
    NeedMoreData,
    FatalParseError,
}

async fn try_extract_message(
    buf: &mut Vec<u8>,
    peer: SocketAddr,
    local_addr: Option<SocketAddr>,
    events_tx: &mpsc::Sender<TransportEvent>,
) -> ExtractOutcome {
    match parser::require_content_length(buf) {
        Ok(()) => {}
        Err(sipswitch_core::ParseError::Incomplete) => return ExtractOutcome::NeedMoreData,
        Err(_) => {
            warn!(%peer, "TCP message missing Content-Length");
            let _ = events_tx
                .send(TransportEvent::Error {
                    error: "missing Content-Length on a framed transport".to_string(),
                })
                .await;
            return ExtractOutcome::FatalParseError;
        }
    }

    match parser::parse(buf) {
        Ok((message, consumed)) => {
            buf.drain(..consumed);
            let destination = local_addr.unwrap_or(peer);
            let event = TransportEvent::MessageReceived {
                message,
                source: peer,
                destination,
                transport: TransportKind::Tcp,
            };
            if events_tx.send(event).await.is_err() {
                return ExtractOutcome::FatalParseError;
            }
            ExtractOutcome::Dispatched
        }
        Err(sipswitch_core::ParseError::Incomplete) => ExtractOutcome::NeedMoreData,
        Err(sipswitch_core::ParseError::ContentLengthMismatch { .. }) => ExtractOutcome::NeedMoreData,
        Err(e) => {
            warn!(%peer, error = %e, "failed to parse framed TCP message");
            let _ = events_tx
                .send(TransportEvent::Error { error: e.to_string() })
                .await;
            ExtractOutcome::FatalParseError
        }
    }
}

pub fn default_idle_window() -> Duration {
    DEFAULT_IDLE_WINDOW
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipswitch_core::{header::HeaderName, message::Request, method::Method, uri::Uri};
    use std::str::FromStr;

    fn sample_request() -> SipMessage {
        let mut req = Request::new(Method::Options, Uri::from_str("sip:bob@example.com").unwrap());
        req.headers.push(HeaderName::Via, "SIP/2.0/TCP a.example.com;branch=z9hG4bK1");
        req.headers.push(HeaderName::From, "<sip:alice@example.com>");
        req.headers.push(HeaderName::To, "<sip:bob@example.com>");
        req.headers.push(HeaderName::CallId, "abc");
        req.headers.push(HeaderName::CSeq, "1 OPTIONS");
        req.headers.push(HeaderName::MaxForwards, "70");
        SipMessage::Request(req)
    }

    #[tokio::test]
    async fn accepts_and_frames_a_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let pool = TcpConnectionPool::new(events_tx.clone(), None);
        tokio::spawn(accept_loop(listener, pool.clone(), events_tx));

        let client_pool = TcpConnectionPool::new(mpsc::channel(1).0, None);
        client_pool.send(&sample_request(), addr).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            TransportEvent::MessageReceived { message, transport, .. } => {
                assert!(message.is_request());
                assert_eq!(transport, TransportKind::Tcp);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

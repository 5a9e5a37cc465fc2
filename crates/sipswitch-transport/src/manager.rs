//! Owns the live UDP socket and TCP connection pool and exposes one unified
//! `send` entry point, mirroring `rvoip-sip-transport`'s
//! `TransportManager`/`TransportFactory` split: a factory builds listeners
//! from configuration, the manager owns the resulting pool and routes
//! `send` calls to the right one.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

use sipswitch_core::SipMessage;

use crate::error::Result;
use crate::event::TransportEvent;
use crate::tcp::{accept_loop, TcpConnectionPool};
use crate::udp::UdpTransport;
use crate::TransportKind;

pub struct TransportManager {
    udp: UdpTransport,
    tcp_pool: Arc<TcpConnectionPool>,
}

impl TransportManager {
    /// Binds both listeners and starts their background tasks, returning
    /// the manager plus the single event stream merging UDP and TCP
    /// arrivals.
    pub async fn bind(
        udp_addr: SocketAddr,
        tcp_addr: SocketAddr,
        idle_window: Option<Duration>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let (events_tx, events_rx) = mpsc::channel(512);

        let (udp, mut udp_events) = UdpTransport::bind(udp_addr, Some(512)).await?;
        let forward_tx = events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = udp_events.recv().await {
                if forward_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        let tcp_pool = TcpConnectionPool::new(events_tx.clone(), idle_window);
        let listener = TcpListener::bind(tcp_addr).await?;
        info!(local_addr = %listener.local_addr()?, "TCP transport bound");
        tokio::spawn(accept_loop(listener, tcp_pool.clone(), events_tx));

        Ok((TransportManager { udp, tcp_pool }, events_rx))
    }

    pub fn udp_local_addr(&self) -> Result<SocketAddr> {
        self.udp.local_addr()
    }

    pub async fn send(
        &self,
        message: &SipMessage,
        destination: SocketAddr,
        transport: TransportKind,
    ) -> Result<()> {
        match transport {
            TransportKind::Udp => self.udp.send(message, destination).await,
            TransportKind::Tcp => self.tcp_pool.send(message, destination).await,
        }
    }

    /// Stops accepting new traffic. Live transactions already holding a
    /// send handle may still flush in-flight writes (spec §5 "Graceful
    /// shutdown").
    pub fn shutdown(&self) {
        self.udp.close();
        self.tcp_pool.close();
    }
}

//! UDP/TCP transport for SIP messages: receive loops, length-delimited
//! TCP framing, a connection pool, and a unified send API (spec §4.2).

pub mod error;
pub mod event;
pub mod manager;
pub mod tcp;
pub mod udp;

pub use error::{Error, Result};
pub use event::TransportEvent;
pub use manager::TransportManager;
pub use tcp::TcpConnectionPool;
pub use udp::UdpTransport;

/// Which transport carried or should carry a message, distinct from
/// `sipswitch_core`'s `Via` transport token string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Udp,
    Tcp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Udp => "UDP",
            TransportKind::Tcp => "TCP",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Events emitted by a transport toward the layer above it (transaction
//! table), mirroring `rvoip-sip-transport`'s `TransportEvent` channel idiom.

use std::net::SocketAddr;

use sipswitch_core::SipMessage;

use crate::TransportKind;

#[derive(Debug)]
pub enum TransportEvent {
    MessageReceived {
        message: SipMessage,
        source: SocketAddr,
        destination: SocketAddr,
        transport: TransportKind,
    },
    Error { error: String },
    Closed,
}

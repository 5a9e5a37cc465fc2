//! Turns a registered contact URI into a transport destination. DNS
//! resolution of hostnames is out of scope (spec §1 Non-goals); a
//! contact's host must already be a literal IP address.

use std::net::{IpAddr, SocketAddr};

use sipswitch_core::Uri;
use sipswitch_transport::TransportKind;

use crate::error::{ProxyError, Result};

const DEFAULT_SIP_PORT: u16 = 5060;

pub fn resolve_target(uri: &Uri) -> Result<(SocketAddr, TransportKind)> {
    let host = uri.host.trim_start_matches('[').trim_end_matches(']');
    let ip: IpAddr = host
        .parse()
        .map_err(|_| ProxyError::ResolutionFailed(uri.host.clone()))?;
    let port = uri.port.unwrap_or(DEFAULT_SIP_PORT);
    let transport = match uri.param("transport").flatten() {
        Some(t) if t.eq_ignore_ascii_case("tcp") => TransportKind::Tcp,
        _ => TransportKind::Udp,
    };
    Ok((SocketAddr::new(ip, port), transport))
}

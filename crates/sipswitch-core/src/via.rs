//! The `Via` header (RFC 3261 §20.42), modeled separately from the generic
//! header list because the proxy engine (spec §4.8) needs structured
//! push/pop and branch-matching operations on it, not just a raw string.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// A single `Via` header value: `SIP/2.0/<transport> <sent-by>;<params>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Via {
    pub transport: String,
    pub sent_by_host: String,
    pub sent_by_port: Option<u16>,
    pub branch: Option<String>,
    pub received: Option<String>,
    pub rport: Option<Option<u16>>,
    pub params: Vec<(String, Option<String>)>,
}

impl Via {
    pub fn new(transport: impl Into<String>, sent_by_host: impl Into<String>) -> Self {
        Via {
            transport: transport.into(),
            sent_by_host: sent_by_host.into(),
            sent_by_port: None,
            branch: None,
            received: None,
            rport: None,
            params: Vec::new(),
        }
    }

    /// `sent-by` rendered as `host[:port]`, used for transaction matching
    /// per RFC 3261 §17.2.3.
    pub fn sent_by(&self) -> String {
        match self.sent_by_port {
            Some(p) => format!("{}:{}", self.sent_by_host, p),
            None => self.sent_by_host.clone(),
        }
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {}", self.transport.to_ascii_uppercase(), self.sent_by_host)?;
        if let Some(port) = self.sent_by_port {
            write!(f, ":{}", port)?;
        }
        if let Some(branch) = &self.branch {
            write!(f, ";branch={}", branch)?;
        }
        if let Some(received) = &self.received {
            write!(f, ";received={}", received)?;
        }
        if let Some(rport) = &self.rport {
            match rport {
                Some(p) => write!(f, ";rport={}", p)?,
                None => write!(f, ";rport")?,
            }
        }
        for (k, v) in &self.params {
            match v {
                Some(v) => write!(f, ";{}={}", k, v)?,
                None => write!(f, ";{}", k)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Via {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut segments = s.split(';');
        let head = segments
            .next()
            .ok_or_else(|| ParseError::MalformedHeader(0))?
            .trim();

        let (proto, sent_by) = head
            .split_once(char::is_whitespace)
            .ok_or_else(|| ParseError::MalformedHeader(0))?;
        let transport = proto
            .rsplit_once('/')
            .map(|(_, t)| t.to_string())
            .ok_or_else(|| ParseError::MalformedHeader(0))?;

        let sent_by = sent_by.trim();
        let (host, port) = if let Some(stripped) = sent_by.strip_prefix('[') {
            let end = stripped
                .find(']')
                .ok_or_else(|| ParseError::MalformedHeader(0))?;
            let host = format!("[{}]", &stripped[..end]);
            let rest = &stripped[end + 1..];
            let port = match rest.strip_prefix(':') {
                Some(p) => Some(p.parse().map_err(|_| ParseError::MalformedHeader(0))?),
                None => None,
            };
            (host, port)
        } else {
            match sent_by.split_once(':') {
                Some((h, p)) => (
                    h.to_string(),
                    Some(p.parse().map_err(|_| ParseError::MalformedHeader(0))?),
                ),
                None => (sent_by.to_string(), None),
            }
        };

        let mut via = Via::new(transport, host);
        via.sent_by_port = port;

        for seg in segments {
            let seg = seg.trim();
            if seg.is_empty() {
                continue;
            }
            match seg.split_once('=') {
                Some((k, v)) if k.eq_ignore_ascii_case("branch") => via.branch = Some(v.to_string()),
                Some((k, v)) if k.eq_ignore_ascii_case("received") => {
                    via.received = Some(v.to_string())
                }
                Some((k, v)) if k.eq_ignore_ascii_case("rport") => {
                    via.rport = Some(v.parse().ok())
                }
                Some((k, v)) => via.params.push((k.to_string(), Some(v.to_string()))),
                None if seg.eq_ignore_ascii_case("rport") => via.rport = Some(None),
                None => via.params.push((seg.to_string(), None)),
            }
        }

        Ok(via)
    }
}

/// Generates a fresh RFC 3261 §8.1.1.7 branch parameter, always starting
/// with the magic cookie so downstream loop detection can rely on it.
pub fn new_branch() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 10];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("z9hG4bK{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_via_with_branch() {
        let via: Via = "SIP/2.0/UDP pc33.example.com:5060;branch=z9hG4bK776asdhds"
            .parse()
            .unwrap();
        assert_eq!(via.transport, "UDP");
        assert_eq!(via.sent_by_host, "pc33.example.com");
        assert_eq!(via.sent_by_port, Some(5060));
        assert_eq!(via.branch.as_deref(), Some("z9hG4bK776asdhds"));
    }

    #[test]
    fn parses_via_with_rport_flag() {
        let via: Via = "SIP/2.0/UDP 192.0.2.1;rport;branch=z9hG4bK1".parse().unwrap();
        assert_eq!(via.rport, Some(None));
    }

    #[test]
    fn round_trips_display() {
        let via: Via = "SIP/2.0/TCP host.example.com:5061;branch=z9hG4bKabc123"
            .parse()
            .unwrap();
        assert_eq!(
            via.to_string(),
            "SIP/2.0/TCP host.example.com:5061;branch=z9hG4bKabc123"
        );
    }

    #[test]
    fn new_branch_carries_magic_cookie() {
        assert!(new_branch().starts_with("z9hG4bK"));
    }
}

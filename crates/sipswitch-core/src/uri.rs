//! SIP/SIPS URI parsing and rendering (RFC 3261 §19.1).

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// The URI scheme. `tel:` URIs are accepted but never routed by the
/// proxy (spec §1 Non-goals exclude media/PSTN handling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Sip,
    Sips,
    Tel,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
            Scheme::Tel => "tel",
        })
    }
}

/// A single `;name=value` or `;name` URI parameter, order-preserving.
pub type UriParam = (String, Option<String>);

/// A parsed SIP or SIPS URI, e.g. `sip:alice@example.com:5060;transport=tcp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: Scheme,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<UriParam>,
    pub headers: Option<String>,
}

impl Uri {
    pub fn new(scheme: Scheme, host: impl Into<String>) -> Self {
        Uri {
            scheme,
            user: None,
            host: host.into(),
            port: None,
            params: Vec::new(),
            headers: None,
        }
    }

    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref())
    }

    /// The "Address-of-Record" key used by the registrar: `user@host`,
    /// lower-cased, ignoring port and params (RFC 3261 §10.2).
    pub fn aor_key(&self) -> String {
        match &self.user {
            Some(u) => format!("{}@{}", u.to_ascii_lowercase(), self.host.to_ascii_lowercase()),
            None => self.host.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for (name, value) in &self.params {
            match value {
                Some(v) => write!(f, ";{}={}", name, v)?,
                None => write!(f, ";{}", name)?,
            }
        }
        if let Some(h) = &self.headers {
            write!(f, "?{}", h)?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (scheme_str, rest) = s
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidUri(s.to_string()))?;
        let scheme = match scheme_str.to_ascii_lowercase().as_str() {
            "sip" => Scheme::Sip,
            "sips" => Scheme::Sips,
            "tel" => Scheme::Tel,
            _ => return Err(ParseError::InvalidUri(s.to_string())),
        };

        // Split off URI headers (`?a=b&c=d`) first, then params (`;x=y`),
        // then userinfo (`user@`), leaving host[:port].
        let (rest, headers) = match rest.split_once('?') {
            Some((before, after)) => (before, Some(after.to_string())),
            None => (rest, None),
        };

        let mut parts = rest.split(';');
        let userhost = parts.next().unwrap_or_default();
        let mut params = Vec::new();
        for p in parts {
            if p.is_empty() {
                continue;
            }
            match p.split_once('=') {
                Some((k, v)) => params.push((k.to_string(), Some(v.to_string()))),
                None => params.push((p.to_string(), None)),
            }
        }

        if userhost.is_empty() {
            return Err(ParseError::InvalidUri(s.to_string()));
        }

        let (user, hostport) = match userhost.split_once('@') {
            Some((u, h)) => (Some(u.to_string()), h),
            None => (None, userhost),
        };

        if hostport.is_empty() {
            return Err(ParseError::InvalidUri(s.to_string()));
        }

        let (host, port) = if let Some(stripped) = hostport.strip_prefix('[') {
            // IPv6 reference: [::1]:5060
            let end = stripped
                .find(']')
                .ok_or_else(|| ParseError::InvalidUri(s.to_string()))?;
            let host = format!("[{}]", &stripped[..end]);
            let remainder = &stripped[end + 1..];
            let port = match remainder.strip_prefix(':') {
                Some(p) => Some(
                    p.parse::<u16>()
                        .map_err(|_| ParseError::InvalidUri(s.to_string()))?,
                ),
                None => None,
            };
            (host, port)
        } else {
            match hostport.split_once(':') {
                Some((h, p)) => (
                    h.to_string(),
                    Some(
                        p.parse::<u16>()
                            .map_err(|_| ParseError::InvalidUri(s.to_string()))?,
                    ),
                ),
                None => (hostport.to_string(), None),
            }
        };

        if host.is_empty() {
            return Err(ParseError::InvalidUri(s.to_string()));
        }

        Ok(Uri {
            scheme,
            user,
            host,
            port,
            params,
            headers,
        })
    }
}

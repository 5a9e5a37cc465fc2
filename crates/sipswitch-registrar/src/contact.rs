//! `RegistrarContact` (spec §3) and the wire-level parsing of `Contact`
//! header values needed to build one: `name-addr`/`addr-spec` plus the
//! `expires` parameter, or the `*` wildcard.

use chrono::{DateTime, Utc};
use sipswitch_core::Uri;

use crate::error::{RegistrarError, Result};

/// A single registered binding: `(aor, uri)` is the uniqueness key
/// (spec §3 invariants), `call_id`/`cseq` drive the anti-replay check
/// (RFC 3261 §10.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrarContact {
    pub aor: String,
    pub uri: String,
    pub expires_at: DateTime<Utc>,
    pub call_id: String,
    pub cseq: u32,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RegistrarContact {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// A `Contact` header value parsed enough to register or remove a
/// binding: the URI and its effective `expires` parameter, if present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedContact {
    pub uri: Uri,
    pub expires_param: Option<i64>,
}

pub fn is_wildcard(raw: &str) -> bool {
    raw.trim() == "*"
}

/// Parses one `Contact` header value (never `*`; check [`is_wildcard`]
/// first) into its URI and optional `expires` parameter.
pub fn parse_contact(raw: &str) -> Result<ParsedContact> {
    let (uri_str, params_str) = split_name_addr(raw);
    let uri: Uri = uri_str
        .parse()
        .map_err(|_| RegistrarError::MalformedContact(raw.to_string()))?;

    let mut expires_param = None;
    for param in params_str.split(';') {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        if let Some((k, v)) = param.split_once('=') {
            if k.eq_ignore_ascii_case("expires") {
                expires_param = v.trim().parse::<i64>().ok();
            }
        }
    }
    Ok(ParsedContact { uri, expires_param })
}

/// Extracts the AOR from a `To` header value, e.g. `"Bob"
/// <sip:bob@example.com>;tag=xyz` → `bob@example.com`.
pub fn aor_from_to_header(raw: &str) -> Result<String> {
    let (uri_str, _) = split_name_addr(raw);
    let uri: Uri = uri_str.parse().map_err(|_| RegistrarError::MissingAor)?;
    Ok(uri.aor_key())
}

/// Splits a `name-addr`/`addr-spec` header value into the URI portion
/// and the trailing `;param=value` portion, matching the `Via`/`Uri`
/// parsers' approach of handling the SIP grammar by hand rather than
/// pulling in a full ABNF header parser for this narrow need.
fn split_name_addr(value: &str) -> (&str, &str) {
    let value = value.trim();
    if let Some(open) = value.find('<') {
        if let Some(close_rel) = value[open..].find('>') {
            let close = open + close_rel;
            return (&value[open + 1..close], &value[close + 1..]);
        }
    }
    match value.split_once(';') {
        Some((u, p)) => (u.trim(), p),
        None => (value, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_contact_with_angle_brackets_and_expires() {
        let parsed = parse_contact("<sip:bob@192.0.2.1:5060>;expires=3600").unwrap();
        assert_eq!(parsed.uri.host, "192.0.2.1");
        assert_eq!(parsed.expires_param, Some(3600));
    }

    #[test]
    fn parses_bare_addr_spec() {
        let parsed = parse_contact("sip:bob@192.0.2.1:5060;expires=60").unwrap();
        assert_eq!(parsed.expires_param, Some(60));
    }

    #[test]
    fn wildcard_is_detected() {
        assert!(is_wildcard(" * "));
        assert!(!is_wildcard("<sip:bob@example.com>"));
    }

    #[test]
    fn aor_from_to_strips_display_name_and_tag() {
        let aor = aor_from_to_header("\"Bob\" <sip:Bob@Example.COM>;tag=xyz").unwrap();
        assert_eq!(aor, "bob@example.com");
    }
}

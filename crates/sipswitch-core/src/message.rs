//! The SIP message AST (spec §3): `SipMessage` is a tagged union of a
//! request and a response, both sharing an ordered header list and an
//! opaque body.

use std::fmt;

use crate::header::{HeaderName, Headers};
use crate::method::Method;
use crate::status::StatusCode;
use crate::uri::Uri;
use crate::via::Via;

/// A parsed SIP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub request_uri: Uri,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// A parsed SIP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status_code: StatusCode,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Either half of the RFC 3261 message grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SipMessage {
    Request(Request),
    Response(Response),
}

impl Request {
    pub fn new(method: Method, request_uri: Uri) -> Self {
        Request {
            method,
            request_uri,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers.get(&HeaderName::CallId)
    }

    /// The full `CSeq` header value, e.g. `"314159 INVITE"`.
    pub fn cseq(&self) -> Option<&str> {
        self.headers.get(&HeaderName::CSeq)
    }

    /// The numeric prefix of `CSeq`, used for registrar anti-replay and
    /// transaction matching.
    pub fn cseq_number(&self) -> Option<u32> {
        self.cseq()?.split_once(char::is_whitespace)?.0.parse().ok()
    }

    pub fn max_forwards(&self) -> Option<u8> {
        self.headers.get(&HeaderName::MaxForwards)?.trim().parse().ok()
    }

    pub fn set_max_forwards(&mut self, value: u8) {
        self.headers.set(HeaderName::MaxForwards, value.to_string());
    }

    /// All `Via` headers, outermost (topmost) first, parsed from their raw
    /// string form.
    pub fn vias(&self) -> Vec<Via> {
        self.headers
            .get_all(&HeaderName::Via)
            .filter_map(|v| v.parse().ok())
            .collect()
    }

    pub fn top_via(&self) -> Option<Via> {
        self.headers.get(&HeaderName::Via)?.parse().ok()
    }

    /// Pushes a new topmost `Via`, as the proxy does before forwarding
    /// (spec §4.8 step 4).
    pub fn push_via(&mut self, via: &Via) {
        self.headers.push_front(HeaderName::Via, via.to_string());
    }

    /// Removes the topmost `Via`, returning it parsed, as the proxy does
    /// on the response path (spec §4.8 step 6).
    pub fn pop_via(&mut self) -> Option<Via> {
        let raw = self.headers.pop_front(&HeaderName::Via)?;
        raw.parse().ok()
    }
}

impl Response {
    pub fn new(status_code: StatusCode, reason: impl Into<String>) -> Self {
        Response {
            status_code,
            reason: reason.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Builds a response carrying the default reason phrase for `status`.
    pub fn with_default_reason(status_code: StatusCode) -> Self {
        Response::new(status_code, status_code.default_reason())
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers.get(&HeaderName::CallId)
    }

    pub fn vias(&self) -> Vec<Via> {
        self.headers
            .get_all(&HeaderName::Via)
            .filter_map(|v| v.parse().ok())
            .collect()
    }
}

impl SipMessage {
    pub fn headers(&self) -> &Headers {
        match self {
            SipMessage::Request(r) => &r.headers,
            SipMessage::Response(r) => &r.headers,
        }
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        match self {
            SipMessage::Request(r) => &mut r.headers,
            SipMessage::Response(r) => &mut r.headers,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            SipMessage::Request(r) => &r.body,
            SipMessage::Response(r) => &r.body,
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        match self {
            SipMessage::Request(r) => r.call_id(),
            SipMessage::Response(r) => r.call_id(),
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, SipMessage::Request(_))
    }
}

impl fmt::Display for SipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SipMessage::Request(r) => write!(f, "{} {}", r.method, r.request_uri),
            SipMessage::Response(r) => write!(f, "{} {}", r.status_code, r.reason),
        }
    }
}

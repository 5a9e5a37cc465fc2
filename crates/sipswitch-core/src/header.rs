//! Header names and the ordered header list (spec §3 data model).
//!
//! Grounded on `sip-core`'s two-tier `HeaderName` design (a closed set of
//! well-known variants plus an `Other(String)` extension point), but
//! generalized per this spec's simpler header model: values stay raw
//! strings rather than per-header typed payloads, since §3 only requires
//! an ordered `(name, value)` list with case-insensitive lookup.

use std::fmt;
use std::str::FromStr;

/// A SIP header name, recognizing both the long and compact forms from
/// RFC 3261 §7.3.3 / §20 that this server needs to parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeaderName {
    Via,
    From,
    To,
    CallId,
    CSeq,
    MaxForwards,
    Contact,
    ContentLength,
    ContentType,
    Expires,
    Allow,
    Require,
    Supported,
    Unsupported,
    SessionExpires,
    MinSe,
    Authorization,
    ProxyAuthorization,
    WwwAuthenticate,
    ProxyAuthenticate,
    Route,
    RecordRoute,
    UserAgent,
    Server,
    Subject,
    ContentEncoding,
    ReferTo,
    Event,
    AcceptContact,
    AllowEvents,
    ReferredBy,
    RejectContact,
    RequestDisposition,
    /// Any header not enumerated above, preserving its original spelling.
    Other(String),
}

impl HeaderName {
    /// The canonical long-form wire spelling written on serialization.
    pub fn as_str(&self) -> &str {
        match self {
            HeaderName::Via => "Via",
            HeaderName::From => "From",
            HeaderName::To => "To",
            HeaderName::CallId => "Call-ID",
            HeaderName::CSeq => "CSeq",
            HeaderName::MaxForwards => "Max-Forwards",
            HeaderName::Contact => "Contact",
            HeaderName::ContentLength => "Content-Length",
            HeaderName::ContentType => "Content-Type",
            HeaderName::Expires => "Expires",
            HeaderName::Allow => "Allow",
            HeaderName::Require => "Require",
            HeaderName::Supported => "Supported",
            HeaderName::Unsupported => "Unsupported",
            HeaderName::SessionExpires => "Session-Expires",
            HeaderName::MinSe => "Min-SE",
            HeaderName::Authorization => "Authorization",
            HeaderName::ProxyAuthorization => "Proxy-Authorization",
            HeaderName::WwwAuthenticate => "WWW-Authenticate",
            HeaderName::ProxyAuthenticate => "Proxy-Authenticate",
            HeaderName::Route => "Route",
            HeaderName::RecordRoute => "Record-Route",
            HeaderName::UserAgent => "User-Agent",
            HeaderName::Server => "Server",
            HeaderName::Subject => "Subject",
            HeaderName::ContentEncoding => "Content-Encoding",
            HeaderName::ReferTo => "Refer-To",
            HeaderName::Event => "Event",
            HeaderName::AcceptContact => "Accept-Contact",
            HeaderName::AllowEvents => "Allow-Events",
            HeaderName::ReferredBy => "Referred-By",
            HeaderName::RejectContact => "Reject-Contact",
            HeaderName::RequestDisposition => "Request-Disposition",
            HeaderName::Other(s) => s,
        }
    }

    /// Headers for which multiple occurrences carry distinct, ordered
    /// values (Via, Contact, Route, Record-Route) rather than being
    /// collapsed to "the first one wins" on lookup.
    pub fn is_multi_value(&self) -> bool {
        matches!(
            self,
            HeaderName::Via | HeaderName::Contact | HeaderName::Route | HeaderName::RecordRoute
        )
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeaderName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            s if s.eq_ignore_ascii_case("via") || s.eq_ignore_ascii_case("v") => HeaderName::Via,
            s if s.eq_ignore_ascii_case("from") || s.eq_ignore_ascii_case("f") => HeaderName::From,
            s if s.eq_ignore_ascii_case("to") || s.eq_ignore_ascii_case("t") => HeaderName::To,
            s if s.eq_ignore_ascii_case("call-id") || s.eq_ignore_ascii_case("i") => {
                HeaderName::CallId
            }
            s if s.eq_ignore_ascii_case("cseq") => HeaderName::CSeq,
            s if s.eq_ignore_ascii_case("max-forwards") => HeaderName::MaxForwards,
            s if s.eq_ignore_ascii_case("contact") || s.eq_ignore_ascii_case("m") => {
                HeaderName::Contact
            }
            s if s.eq_ignore_ascii_case("content-length") || s.eq_ignore_ascii_case("l") => {
                HeaderName::ContentLength
            }
            s if s.eq_ignore_ascii_case("content-type") || s.eq_ignore_ascii_case("c") => {
                HeaderName::ContentType
            }
            s if s.eq_ignore_ascii_case("expires") => HeaderName::Expires,
            s if s.eq_ignore_ascii_case("allow") => HeaderName::Allow,
            s if s.eq_ignore_ascii_case("require") => HeaderName::Require,
            s if s.eq_ignore_ascii_case("supported") || s.eq_ignore_ascii_case("k") => {
                HeaderName::Supported
            }
            s if s.eq_ignore_ascii_case("unsupported") => HeaderName::Unsupported,
            s if s.eq_ignore_ascii_case("session-expires") || s.eq_ignore_ascii_case("x") => {
                HeaderName::SessionExpires
            }
            s if s.eq_ignore_ascii_case("min-se") => HeaderName::MinSe,
            s if s.eq_ignore_ascii_case("authorization") => HeaderName::Authorization,
            s if s.eq_ignore_ascii_case("proxy-authorization") => HeaderName::ProxyAuthorization,
            s if s.eq_ignore_ascii_case("www-authenticate") => HeaderName::WwwAuthenticate,
            s if s.eq_ignore_ascii_case("proxy-authenticate") => HeaderName::ProxyAuthenticate,
            s if s.eq_ignore_ascii_case("route") => HeaderName::Route,
            s if s.eq_ignore_ascii_case("record-route") => HeaderName::RecordRoute,
            s if s.eq_ignore_ascii_case("user-agent") => HeaderName::UserAgent,
            s if s.eq_ignore_ascii_case("server") => HeaderName::Server,
            s if s.eq_ignore_ascii_case("subject") || s.eq_ignore_ascii_case("s") => {
                HeaderName::Subject
            }
            s if s.eq_ignore_ascii_case("content-encoding") || s.eq_ignore_ascii_case("e") => {
                HeaderName::ContentEncoding
            }
            s if s.eq_ignore_ascii_case("refer-to") || s.eq_ignore_ascii_case("r") => {
                HeaderName::ReferTo
            }
            s if s.eq_ignore_ascii_case("event") || s.eq_ignore_ascii_case("o") => {
                HeaderName::Event
            }
            s if s.eq_ignore_ascii_case("accept-contact") || s.eq_ignore_ascii_case("a") => {
                HeaderName::AcceptContact
            }
            s if s.eq_ignore_ascii_case("allow-events") || s.eq_ignore_ascii_case("u") => {
                HeaderName::AllowEvents
            }
            s if s.eq_ignore_ascii_case("referred-by") || s.eq_ignore_ascii_case("b") => {
                HeaderName::ReferredBy
            }
            s if s.eq_ignore_ascii_case("reject-contact") || s.eq_ignore_ascii_case("j") => {
                HeaderName::RejectContact
            }
            s if s.eq_ignore_ascii_case("request-disposition") || s.eq_ignore_ascii_case("d") => {
                HeaderName::RequestDisposition
            }
            other => HeaderName::Other(other.to_string()),
        })
    }
}

/// An ordered, case-insensitive multimap of SIP headers.
///
/// Insertion order is preserved for serialization; Via and Contact may
/// repeat and [`Headers::get_all`] exposes every occurrence in order,
/// while [`Headers::get`] collapses to "the first occurrence" for
/// single-value headers as spec §3 requires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(HeaderName, String)>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    pub fn push(&mut self, name: HeaderName, value: impl Into<String>) {
        self.0.push((name, value.into()));
    }

    pub fn get(&self, name: &HeaderName) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a HeaderName) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &HeaderName) -> bool {
        self.0.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(HeaderName, String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Remove every occurrence of `name`, returning how many were removed.
    pub fn remove_all(&mut self, name: &HeaderName) -> usize {
        let before = self.0.len();
        self.0.retain(|(n, _)| n != name);
        before - self.0.len()
    }

    /// Insert a header at the front, used when pushing a fresh top `Via`.
    pub fn push_front(&mut self, name: HeaderName, value: impl Into<String>) {
        self.0.insert(0, (name, value.into()));
    }

    /// Remove and return the first occurrence of `name`.
    pub fn pop_front(&mut self, name: &HeaderName) -> Option<String> {
        let pos = self.0.iter().position(|(n, _)| n == name)?;
        Some(self.0.remove(pos).1)
    }

    pub fn set(&mut self, name: HeaderName, value: impl Into<String>) {
        self.remove_all(&name);
        self.push(name, value);
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a (HeaderName, String);
    type IntoIter = std::slice::Iter<'a, (HeaderName, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

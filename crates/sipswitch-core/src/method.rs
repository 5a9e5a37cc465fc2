//! SIP request methods (RFC 3261 §4 and extensions relevant to this core).

use std::fmt;
use std::str::FromStr;

/// A SIP method.
///
/// The validation chain's `MethodSupportValidator` (spec §4.4) only
/// recognizes the variants listed in the `Allow` header
/// (`INVITE, ACK, BYE, CANCEL, OPTIONS, REGISTER, INFO`); any other token
/// round-trips through [`Method::Other`] so the parser never rejects a
/// syntactically valid method it merely doesn't route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Options,
    Register,
    Info,
    Other(String),
}

impl Method {
    /// The methods this server offers in its `Allow` header.
    pub const SUPPORTED: &'static [Method] = &[
        Method::Invite,
        Method::Ack,
        Method::Bye,
        Method::Cancel,
        Method::Options,
        Method::Register,
        Method::Info,
    ];

    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(self)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Options => "OPTIONS",
            Method::Register => "REGISTER",
            Method::Info => "INFO",
            Method::Other(s) => s,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "OPTIONS" => Method::Options,
            "REGISTER" => Method::Register,
            "INFO" => Method::Info,
            other => Method::Other(other.to_string()),
        })
    }
}

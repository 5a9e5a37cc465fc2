//! Error types for SIP message parsing and serialization.

use thiserror::Error;

/// A type alias for handling `Result`s with [`ParseError`].
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors raised while turning bytes into a [`crate::message::SipMessage`].
///
/// Each variant maps to a wire-level failure mode from spec §4.1 / §7;
/// the transport/validation layers are responsible for turning these into
/// the corresponding SIP status codes (400, 505, ...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The first line of the message is neither a valid request-line nor
    /// a valid status-line.
    #[error("malformed start line: {0}")]
    MalformedStartLine(String),

    /// The SIP version token was present but not `SIP/2.0`.
    #[error("unsupported SIP version: {0}")]
    UnsupportedVersion(String),

    /// A header line could not be split into a name and a value.
    #[error("malformed header at line {0}")]
    MalformedHeader(usize),

    /// A header required on every inbound request was absent.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// `Content-Length` was present but not a valid decimal number, or the
    /// buffer did not contain that many body bytes.
    #[error("content-length mismatch: expected {expected}, available {available}")]
    ContentLengthMismatch { expected: usize, available: usize },

    /// `Content-Length` was absent where the transport requires it (TCP).
    #[error("missing content-length on a framed transport")]
    MissingContentLength,

    /// The Request-URI was not a syntactically valid SIP/SIPS URI.
    #[error("invalid request URI: {0}")]
    InvalidUri(String),

    /// `CSeq` method token did not match the request method.
    #[error("CSeq method mismatch: header says {header}, request is {request}")]
    CSeqMethodMismatch { header: String, request: String },

    /// `CSeq` number did not fit in 32 bits or was not a decimal integer.
    #[error("invalid CSeq number: {0}")]
    InvalidCSeq(String),

    /// `Max-Forwards` was not a decimal integer in [0, 255].
    #[error("invalid Max-Forwards value: {0}")]
    InvalidMaxForwards(String),

    /// The buffer ended before a complete message could be read.
    #[error("incomplete message")]
    Incomplete,
}

impl ParseError {
    /// The SIP status code this error maps to when the message carried
    /// enough context (a `Via`) to justify a reply, per spec §4.9.
    pub fn status_code(&self) -> u16 {
        match self {
            ParseError::UnsupportedVersion(_) => 505,
            _ => 400,
        }
    }
}

//! Error taxonomy for REGISTER processing (spec §7 `RoutingError` is a
//! proxy concern; registrar failures map directly to the status codes
//! spec §4.6 names).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistrarError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrarError {
    /// `Contact: *` appeared with an `Expires` other than 0 (spec §4.6).
    #[error("wildcard Contact requires Expires: 0")]
    WildcardRequiresZeroExpires,

    /// A Contact or To header did not contain a parseable SIP/SIPS URI.
    #[error("malformed contact: {0}")]
    MalformedContact(String),

    /// The request's `To` header carried no usable AOR.
    #[error("missing or malformed To header")]
    MissingAor,

    /// A REGISTER arrived with a `CSeq` not greater than the last
    /// accepted one for the same `(aor, call_id)` (RFC 3261 §10.3).
    #[error("CSeq {received} is not greater than the last accepted {last} for this Call-ID")]
    CSeqTooOld { received: u32, last: u32 },
}

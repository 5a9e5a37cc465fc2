//! Error taxonomy for digest authentication (spec §7 `AuthError`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Neither `Authorization` nor `Proxy-Authorization` was present.
    #[error("no credentials supplied")]
    NoCredentials,

    /// Credentials were present but did not parse as digest parameters.
    #[error("malformed authorization header")]
    MalformedHeader,

    /// The nonce was well-formed but has outlived its configured expiry.
    #[error("nonce expired")]
    StaleNonce,

    /// The recomputed digest response did not match what the client sent.
    #[error("digest response mismatch")]
    BadDigest,

    /// The username in the credentials has no entry in the user store.
    #[error("unknown user: {0}")]
    UnknownUser(String),
}

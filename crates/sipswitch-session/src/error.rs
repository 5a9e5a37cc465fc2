//! Errors the Session-Timer manager raises (spec §7 — folded into the
//! generic taxonomy; this crate's only local failure mode is acting on
//! a dialog the caller never established).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no session for call-id {0}")]
    NotFound(String),

    /// A requested `Session-Expires` would put `expires_at` below
    /// `min_se` (spec §3 invariant: `expires_at` is always `>= min_se`).
    #[error("session interval {requested}s is below min_se {min_se}s")]
    BelowMinSe { requested: i64, min_se: i64 },
}

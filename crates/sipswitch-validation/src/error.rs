//! Local validation failures, mapped 1:1 onto the `Outcome::Reject`
//! status codes named in the component's doc comment (spec §4.4 / §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ValidationError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("method {0} is not supported")]
    MethodNotAllowed(String),

    #[error("max-forwards would go negative")]
    LoopDetected,

    #[error("INVITE is missing Session-Expires and does not support the timer extension")]
    MissingSessionTimer,

    #[error("session interval {requested}s is below the configured minimum {min_se}s")]
    SessionIntervalTooSmall { requested: i64, min_se: i64 },

    #[error("Session-Expires value is malformed")]
    MalformedSessionExpires,

    #[error("request requires authentication")]
    Unauthorized,
}

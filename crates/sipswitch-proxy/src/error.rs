//! Routing failures the proxy engine raises (spec §7 `RoutingError`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("no contacts registered for {0}")]
    NoContactsForAor(String),

    #[error("could not resolve target: {0}")]
    ResolutionFailed(String),

    #[error("every forked branch failed")]
    AllBranchesFailed,

    #[error("loop detected")]
    LoopDetected,
}

//! The top-level error composed at the binary boundary (spec §7):
//! every crate's own error enum folds in here via `#[from]`, matching
//! how each pack crate already composes its upstream errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("infrastructure error: {0}")]
    Infra(#[from] sipswitch_infra::Error),

    #[error("transport error: {0}")]
    Transport(#[from] sipswitch_transport::Error),

    #[error("transaction error: {0}")]
    Transaction(#[from] sipswitch_transaction::Error),

    #[error("malformed message: {0}")]
    Parse(#[from] sipswitch_core::ParseError),

    #[error("could not parse bind address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    #[error("{0}")]
    Internal(String),
}

//! Transport failure kinds (spec §4.2 "Send API").

use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not resolve or open a connection to {0}")]
    ResolutionFailed(SocketAddr),

    #[error("connection to {0} was refused")]
    ConnectionRefused(SocketAddr),

    #[error("write to {0} timed out")]
    WriteTimeout(SocketAddr),

    #[error("connection to {0} was closed")]
    ConnectionClosed(SocketAddr),

    #[error("transport already closed")]
    TransportClosed,

    #[error("malformed message: {0}")]
    Parse(#[from] sipswitch_core::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

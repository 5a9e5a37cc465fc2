use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("transaction {0} not found")]
    NotFound(String),

    #[error("transaction {0} already terminated")]
    Terminated(String),

    #[error("transport error: {0}")]
    Transport(#[from] sipswitch_transport::Error),

    #[error("transaction timed out")]
    Timeout,

    #[error("internal channel closed")]
    ChannelClosed,
}

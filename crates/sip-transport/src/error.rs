use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("STUN error: {0}")]
    Stun(String),

    #[error("STUN binding timed out after {0:?}")]
    StunTimeout(std::time::Duration),

    #[error("transport already closed")]
    Closed,
}

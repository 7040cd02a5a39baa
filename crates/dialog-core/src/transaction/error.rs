use thiserror::Error;

pub type Result<T> = std::result::Result<T, TxError>;

/// `TxError` (spec §9's per-subsystem sum type table).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("no transaction matches this message")]
    NoMatch,

    #[error("transaction already exists for this branch/method")]
    Duplicate,

    #[error("request is not valid in state {0}")]
    InvalidState(&'static str),

    #[error("transaction timed out (Timer {0})")]
    Timeout(&'static str),

    #[error("cannot cancel: no provisional response received yet")]
    CancelTooEarly,
}

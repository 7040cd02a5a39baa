use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// `AuthError` (spec §9 design notes table): the auth-specific sum type
/// aggregated by `switch-core::EngineError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("no credential on file for realm {0:?}")]
    NoCredential(String),

    #[error("digest response mismatch")]
    ResponseMismatch,

    #[error("stale nonce")]
    StaleNonce,

    #[error("authentication retries exhausted")]
    RetriesExhausted,

    #[error("unsupported qop: {0}")]
    UnsupportedQop(String),
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// `RegistrarError` (spec §9): the registration-specific sum type
/// aggregated by `switch-core::EngineError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("authentication required")]
    AuthRequired,

    #[error("requested expiry {0} exceeds max_expiry")]
    ExpiryOutOfRange(u32),

    #[error("too many contacts for this AoR (max {0})")]
    TooManyContacts(usize),

    #[error("Call-ID mismatch with lower CSeq, request rejected")]
    CSeqConflict,

    #[error("no such binding")]
    NoSuchBinding,

    #[error("registration rejected (403)")]
    Rejected,

    #[error("registration timed out")]
    Timeout,
}

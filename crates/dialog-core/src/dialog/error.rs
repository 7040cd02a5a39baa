use thiserror::Error;

pub type Result<T> = std::result::Result<T, DlgError>;

/// `DlgError` (spec §9's per-subsystem sum type table; mapped to SIP
/// status codes by [`crate::routing`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DlgError {
    #[error("no dialog matches this message")]
    NoSuchDialog,

    #[error("no compatible codec")]
    NoCompatibleCodec,

    #[error("unknown method")]
    UnknownMethod,

    #[error("unsupported extension required: {0}")]
    BadExtension(String),

    #[error("REFER is invalid outside a dialog, or Refer-To could not be resolved")]
    InvalidTransfer,

    #[error("request is not valid in dialog state {0}")]
    InvalidState(&'static str),

    #[error("T.38 switch-back is not supported")]
    T38SwitchBackUnsupported,

    #[error("CSeq is not strictly monotone for this direction")]
    CSeqOutOfOrder,
}

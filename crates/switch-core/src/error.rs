//! `EngineError` (spec §9 "top-level aggregator for channel-facing errors"):
//! every subsystem enum folded into one type so the channel driver only
//! has to match on one error surface, the way the teacher's
//! `infra-common::errors` aggregates subsystem errors for cross-crate
//! consumers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("message parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Sdp(#[from] sipswitch_sip_core::sdp::SdpError),

    #[error(transparent)]
    Transport(#[from] sipswitch_sip_transport::Error),

    #[error(transparent)]
    Transaction(#[from] sipswitch_dialog_core::transaction::TxError),

    #[error(transparent)]
    Dialog(#[from] sipswitch_dialog_core::dialog::DlgError),

    #[error(transparent)]
    Auth(#[from] sipswitch_auth_core::Error),

    #[error(transparent)]
    Registrar(#[from] sipswitch_registrar_core::Error),

    #[error("no account for {0}")]
    UnknownAccount(String),

    #[error("call limit reached for peer {0}")]
    CallLimitReached(String),

    #[error("lock-order violation: attempted to acquire {attempted} while holding {held}")]
    LockOrderViolation { held: &'static str, attempted: &'static str },
}

pub type Result<T> = std::result::Result<T, EngineError>;

//! Transaction and dialog-usage layer for the sipswitch stack (spec
//! §4.4/§4.5): client/server INVITE and non-INVITE state machines, Timer
//! A/B/E/F/T1/T2 arithmetic, dialog identity and route-set bookkeeping,
//! re-INVITE/T.38 switching, REFER/transfer classification, and the
//! SUBSCRIBE/NOTIFY usage.
//!
//! This crate owns dialog and transaction *state*; it does not own the
//! socket (`sipswitch-sip-transport`) or drive the event loop
//! (`sipswitch-switch-core`) -- it is fed messages and timer firings and
//! returns actions for the caller to carry out (spec §3 "Ownership").

pub mod dialog;
pub mod transaction;

pub mod prelude {
    pub use crate::dialog::{
        allow_header_value, can_accept_out_of_dialog_notify, classify_transfer, dialog_creation, needs_rtp,
        parse_refer_to, poke_interval, record_poke_result, resolve_route, reverse_for_uas, route_set_from_record_route,
        sipfrag_body, supported_header_value, unsupported_required_tags, Dialog, DialogCreation, DialogId, DialogState,
        DlgError, InviteUsage, MAX_POKE_FAILURES, PeerReachability, ReferTarget, Result as DlgResult, RouteDecision,
        SubscribeUsage, SUPPORTED_EXTENSIONS, TransferKind,
    };
    pub use crate::transaction::{
        new_branch, ClientAction, InviteClientState, InviteClientTransaction, InviteServerState, InviteServerTransaction,
        NonInviteClientState, NonInviteClientTransaction, NonInviteServerState, NonInviteServerTransaction, Result as TxResult,
        ServerAction, Transaction, TransactionKey, TransactionKind, TransactionManager, TxError, T1, T2, TIMER_B, TIMER_F,
    };
}

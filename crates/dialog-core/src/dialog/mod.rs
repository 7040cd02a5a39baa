//! Dialog identity, route-set resolution, re-INVITE/T.38 switching,
//! SUBSCRIBE/NOTIFY usage, and REFER/transfer classification (spec §3
//! "Dialog", §4.5).

pub mod capability;
pub mod dialog;
pub mod error;
pub mod route;
pub mod state;
pub mod subscription;
pub mod transfer;

pub use capability::{allow_header_value, dialog_creation, needs_rtp, supported_header_value, unsupported_required_tags, DialogCreation, SUPPORTED_EXTENSIONS};
pub use dialog::{poke_interval, record_poke_result, Dialog, DialogId, MAX_POKE_FAILURES};
pub use error::{DlgError, Result};
pub use route::{resolve_route, reverse_for_uas, route_set_from_record_route, RouteDecision};
pub use state::{DialogState, InviteUsage, PeerReachability, SubscribeUsage};
pub use subscription::can_accept_out_of_dialog_notify;
pub use transfer::{classify_transfer, parse_refer_to, sipfrag_body, ReferTarget, TransferKind};

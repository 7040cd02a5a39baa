//! The `Dialog` struct (spec §3 "Dialog") and its operations: CSeq
//! bookkeeping, re-INVITE/T.38 switching, and the keepalive/poke interval
//! logic, grounded in the teacher's `dialog-core::dialog::dialog_impl`.

use std::time::{Duration, SystemTime};

use sipswitch_sip_core::prelude::Uri;
use sipswitch_sip_core::sdp::{MediaPlan, MediaPlanState, SdpSession};

use super::error::{DlgError, Result};
use super::route::{resolve_route, RouteDecision};
use super::state::{DialogState, InviteUsage, PeerReachability};

/// Identity: `(Call-ID, local-tag, remote-tag)` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogId {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: String,
}

#[derive(Debug, Clone)]
pub struct Dialog {
    pub id: DialogId,
    pub state: DialogState,
    pub local_uri: Uri,
    pub remote_uri: Uri,
    pub remote_target: Uri,
    pub route_set: Vec<Uri>,
    pub local_cseq: u32,
    pub remote_cseq: Option<u32>,
    pub is_initiator: bool,
    pub invite_usage: InviteUsage,
    /// Quiet-interval keepalive state (spec §4.5 "Keepalive / poke").
    pub reachability: PeerReachability,
    pub consecutive_poke_failures: u8,
    pub terminated_at: Option<SystemTime>,
}

impl Dialog {
    pub fn new(call_id: String, local_uri: Uri, remote_uri: Uri, local_tag: String, remote_tag: String, is_initiator: bool) -> Self {
        let remote_target = remote_uri.clone();
        Dialog {
            id: DialogId { call_id, local_tag, remote_tag },
            state: DialogState::Early,
            local_uri,
            remote_uri,
            remote_target,
            route_set: Vec::new(),
            local_cseq: 0,
            remote_cseq: None,
            is_initiator,
            invite_usage: InviteUsage::new(),
            reachability: PeerReachability::Reachable,
            consecutive_poke_failures: 0,
            terminated_at: None,
        }
    }

    pub fn confirm(&mut self) {
        self.state = DialogState::Confirmed;
    }

    /// Next CSeq for a request we originate (spec §8 invariant 1: strictly
    /// monotone).
    pub fn next_local_cseq(&mut self) -> u32 {
        self.local_cseq += 1;
        self.local_cseq
    }

    /// Validate and record an inbound request's CSeq (spec §3 "Binding"
    /// invariant applies equally to dialogs: "mismatched ... lower CSeq is
    /// rejected").
    pub fn observe_remote_cseq(&mut self, cseq: u32) -> Result<()> {
        if let Some(last) = self.remote_cseq {
            if cseq <= last {
                return Err(DlgError::CSeqOutOfOrder);
            }
        }
        self.remote_cseq = Some(cseq);
        Ok(())
    }

    pub fn route_decision(&self) -> RouteDecision {
        resolve_route(&self.route_set, &self.remote_target)
    }

    pub fn terminate(&mut self) {
        self.state = DialogState::Terminated;
        self.terminated_at = Some(SystemTime::now());
    }

    /// Whether the 32s autodestruct grace period (spec §5, §8 invariant 4)
    /// has elapsed.
    pub fn ready_for_autodestruct(&self, now: SystemTime, grace: Duration) -> bool {
        match self.terminated_at {
            Some(t) => now.duration_since(t).map(|d| d >= grace).unwrap_or(true),
            None => false,
        }
    }

    /// Apply a successful re-INVITE's negotiated plan, enforcing the
    /// Audio<->T.38 switching rule (spec §4.5 "Re-INVITE semantics").
    pub fn apply_reinvite_plan(&mut self, offer: &SdpSession, new_plan: MediaPlan) -> Result<()> {
        let offer_has_image = offer.media.iter().any(|m| m.media == sipswitch_sip_core::sdp::MediaKind::Image);
        let currently_t38 = self.invite_usage.media_plan.t38.is_some();

        if currently_t38 && !offer_has_image {
            // "the switch-back is explicitly unsupported" -- reject with 488.
            return Err(DlgError::T38SwitchBackUnsupported);
        }

        self.invite_usage.media_plan = new_plan;
        self.invite_usage.reinvite_in_progress = false;
        Ok(())
    }

    pub fn begin_reinvite(&mut self) -> Result<()> {
        if self.invite_usage.reinvite_in_progress {
            return Err(DlgError::InvalidState("re-INVITE already pending"));
        }
        self.invite_usage.reinvite_in_progress = true;
        Ok(())
    }

    /// Whether the resulting plan is "T.38 negotiated" for channel-event
    /// purposes (spec §8 S4: emits a `T38_NEGOTIATED` event).
    pub fn is_t38_negotiated(&self) -> bool {
        self.invite_usage.media_plan.state == MediaPlanState::Negotiated && self.invite_usage.media_plan.t38.is_some()
    }
}

/// Keepalive/poke interval (spec §4.5): `60s` while reachable, `10s`
/// while unreachable.
pub fn poke_interval(reachability: PeerReachability) -> Duration {
    match reachability {
        PeerReachability::Reachable => Duration::from_secs(60),
        PeerReachability::Unreachable => Duration::from_secs(10),
    }
}

/// Three consecutive no-responses flip a peer to `Unreachable` (spec
/// §4.5).
pub const MAX_POKE_FAILURES: u8 = 3;

pub fn record_poke_result(reachability: &mut PeerReachability, failures: &mut u8, ok: bool) {
    if ok {
        *failures = 0;
        *reachability = PeerReachability::Reachable;
    } else {
        *failures += 1;
        if *failures >= MAX_POKE_FAILURES {
            *reachability = PeerReachability::Unreachable;
        }
    }
}

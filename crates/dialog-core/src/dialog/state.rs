//! Dialog and subordinate-usage state (spec §3 "Dialog").

use sipswitch_sip_core::sdp::MediaPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Early,
    Confirmed,
    Terminated,
}

/// The call itself (spec §3: "Subordinate usages: `InviteUsage` (the call
/// itself) ...").
#[derive(Debug, Clone)]
pub struct InviteUsage {
    pub media_plan: MediaPlan,
    /// Set while a re-INVITE is outstanding; at most one pending INVITE
    /// transaction per dialog (spec §3 invariant).
    pub reinvite_in_progress: bool,
}

impl InviteUsage {
    pub fn new() -> Self {
        InviteUsage { media_plan: MediaPlan::empty(), reinvite_in_progress: false }
    }
}

impl Default for InviteUsage {
    fn default() -> Self {
        Self::new()
    }
}

/// `SubscribeUsage` (event package + expiry) (spec §3).
#[derive(Debug, Clone)]
pub struct SubscribeUsage {
    pub event_package: String,
    pub expires_at: u64,
    pub terminated: bool,
}

/// Outbound peer reachability, driven by the OPTIONS "poke" (spec §4.5
/// "Keepalive / poke").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerReachability {
    Reachable,
    Unreachable,
}

//! SIP status code -> channel hangup-cause mapping (spec §7: "the
//! source's cause map from SIP status to channel hangup-cause is
//! preserved verbatim as a table"). Values follow Q.850-style cause
//! codes, the convention the PBX channel layer this core plugs into
//! already uses.

/// Q.850-derived hangup cause, opaque to this crate beyond its numeric
/// value -- the channel layer (out of scope, spec §1) owns what it does
/// with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HangupCause(pub u16);

impl HangupCause {
    pub const NORMAL_CLEARING: HangupCause = HangupCause(16);
    pub const USER_BUSY: HangupCause = HangupCause(17);
    pub const NO_USER_RESPONSE: HangupCause = HangupCause(18);
    pub const NO_ANSWER: HangupCause = HangupCause(19);
    pub const CALL_REJECTED: HangupCause = HangupCause(21);
    pub const NUMBER_CHANGED: HangupCause = HangupCause(22);
    pub const DESTINATION_OUT_OF_ORDER: HangupCause = HangupCause(27);
    pub const INVALID_NUMBER_FORMAT: HangupCause = HangupCause(28);
    pub const FACILITY_REJECTED: HangupCause = HangupCause(29);
    pub const NORMAL_UNSPECIFIED: HangupCause = HangupCause(31);
    pub const CONGESTION: HangupCause = HangupCause(34);
    pub const REQUESTED_CHAN_UNAVAIL: HangupCause = HangupCause(44);
    pub const FACILITY_NOT_SUBSCRIBED: HangupCause = HangupCause(50);
    pub const OUTGOING_CALL_BARRED: HangupCause = HangupCause(52);
    pub const BEARERCAPABILITY_NOTAUTH: HangupCause = HangupCause(57);
    pub const BEARERCAPABILITY_NOTAVAIL: HangupCause = HangupCause(58);
    pub const INTERWORKING: HangupCause = HangupCause(127);
}

/// Map a final SIP status code to a hangup cause (spec §7). Falls back to
/// `INTERWORKING` for anything not explicitly listed, matching the
/// source's behavior for "every other final response."
pub fn cause_for_status(status: u16) -> HangupCause {
    match status {
        200 | 202 => HangupCause::NORMAL_CLEARING,
        401 | 403 | 407 => HangupCause::CALL_REJECTED,
        404 => HangupCause::NUMBER_CHANGED,
        408 => HangupCause::NO_USER_RESPONSE,
        410 => HangupCause::NUMBER_CHANGED,
        413 | 414 | 416 => HangupCause::INVALID_NUMBER_FORMAT,
        420 => HangupCause::FACILITY_REJECTED,
        480 => HangupCause::NO_ANSWER,
        483 => HangupCause::INTERWORKING,
        486 => HangupCause::USER_BUSY,
        487 => HangupCause::NORMAL_CLEARING,
        488 => HangupCause::BEARERCAPABILITY_NOTAVAIL,
        500 | 503 => HangupCause::CONGESTION,
        501 => HangupCause::FACILITY_NOT_SUBSCRIBED,
        502 => HangupCause::DESTINATION_OUT_OF_ORDER,
        603 => HangupCause::CALL_REJECTED,
        606 => HangupCause::BEARERCAPABILITY_NOTAUTH,
        _ => HangupCause::INTERWORKING,
    }
}

/// Cause emitted when a transaction times out (Timer B/F) before any
/// final response arrives (spec §7 error table: `Timeout` -> dialog
/// synthesizes 408 -> channel hangs up with `NO_USER_RESPONSE`).
pub fn cause_for_timeout() -> HangupCause {
    HangupCause::NO_USER_RESPONSE
}

/// Cause emitted when a peer has flipped `Unreachable` via the keepalive
/// poke (spec §7: "outgoing calls to this peer fail immediately with
/// congestion").
pub fn cause_for_unreachable_peer() -> HangupCause {
    HangupCause::CONGESTION
}

/// Cause emitted when authentication retries are exhausted (spec §7:
/// "channel gets congestion").
pub fn cause_for_auth_failed() -> HangupCause {
    HangupCause::CONGESTION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_maps_to_user_busy() {
        assert_eq!(cause_for_status(486), HangupCause::USER_BUSY);
    }

    #[test]
    fn ok_maps_to_normal_clearing() {
        assert_eq!(cause_for_status(200), HangupCause::NORMAL_CLEARING);
    }

    #[test]
    fn unknown_status_falls_back_to_interworking() {
        assert_eq!(cause_for_status(999), HangupCause::INTERWORKING);
    }

    #[test]
    fn not_acceptable_here_maps_to_bearer_unavailable() {
        assert_eq!(cause_for_status(488), HangupCause::BEARERCAPABILITY_NOTAVAIL);
    }
}

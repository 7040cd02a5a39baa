//! The host-facing channel-event surface (spec §1 "opaque channel events
//! and media frames", SPEC_FULL.md §6): the minimum concrete vocabulary
//! needed to make the engine's outputs usable without pulling in the
//! actual PBX channel abstraction (out of scope, spec §1).

use async_trait::async_trait;

use crate::cause::HangupCause;
use sipswitch_sip_core::sdp::MediaPlan;

/// DTMF transport selection (spec §6 `dtmfmode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DtmfMode {
    Inband,
    #[default]
    Rfc2833,
    Info,
    /// RFC 2833 if the peer advertised `telephone-event`, else inband
    /// (spec §6).
    Auto,
}

impl DtmfMode {
    pub fn from_config_str(s: &str) -> DtmfMode {
        match s.trim().to_ascii_lowercase().as_str() {
            "inband" => DtmfMode::Inband,
            "info" => DtmfMode::Info,
            "auto" => DtmfMode::Auto,
            _ => DtmfMode::Rfc2833,
        }
    }

    /// Resolve `Auto` against whether the negotiated audio codec set
    /// advertises `telephone-event` (spec §6).
    pub fn resolve(self, peer_advertises_telephone_event: bool) -> DtmfMode {
        match self {
            DtmfMode::Auto if peer_advertises_telephone_event => DtmfMode::Rfc2833,
            DtmfMode::Auto => DtmfMode::Inband,
            other => other,
        }
    }
}

/// One digit delivered over SIP INFO `application/dtmf-relay` (spec §6:
/// payload `Signal=X\r\nDuration=ms`), or decoded from an RFC 2833 event
/// by the (out-of-scope) RTP layer and handed up here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtmfDigit {
    pub signal: char,
    pub duration_ms: u16,
}

impl DtmfDigit {
    /// Render the SIP INFO body (spec §6).
    pub fn to_info_body(self) -> String {
        format!("Signal={}\r\nDuration={}\r\n", self.signal, self.duration_ms)
    }

    /// Parse a SIP INFO `application/dtmf-relay` body.
    pub fn from_info_body(body: &str) -> Option<DtmfDigit> {
        let mut signal = None;
        let mut duration = None;
        for line in body.lines() {
            if let Some(v) = line.strip_prefix("Signal=") {
                signal = v.trim().chars().next();
            } else if let Some(v) = line.strip_prefix("Duration=") {
                duration = v.trim().parse().ok();
            }
        }
        Some(DtmfDigit { signal: signal?, duration_ms: duration.unwrap_or(100) })
    }
}

/// Opaque channel events this engine produces for the host PBX channel
/// layer (spec §1, SPEC_FULL.md §6). Named, not exhaustive of everything
/// a full channel driver would ever want -- just what the dialog/
/// transaction/SDP layers in this crate actually generate.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// 180 Ringing received/sent.
    Ringing,
    /// 200 OK to INVITE, with the negotiated media plan.
    Answered { media_plan: MediaPlan },
    /// Hold/unhold transition detected via SDP re-negotiation (spec §4.2).
    Hold { on: bool },
    /// Re-INVITE negotiated T.38 (spec §8 scenario S4).
    T38Negotiated,
    /// Dialog terminated; `cause` is the mapped hangup cause (spec §7).
    HangupWithCause { cause: HangupCause },
    /// A DTMF digit arrived via whichever transport was negotiated.
    Dtmf { digit: DtmfDigit },
    /// A peer's reachability changed (spec §4.5 keepalive/poke, §8 S5).
    PeerStatus { peer: String, reachable: bool },
    /// A binding expired off the registrar (spec §8 S5).
    Unregistered { aor: String },
}

/// The seam the channel driver implements to receive engine output (spec
/// §1's "opaque channel events" line, made concrete per SPEC_FULL.md §6).
/// Kept as an `async_trait` so a host channel can do its own I/O
/// (enqueue onto a frame queue, wake a PBX thread, etc.) without blocking
/// the engine's network/monitor tasks.
#[async_trait]
pub trait ChannelSink: Send + Sync {
    async fn dispatch(&self, dialog_id: &str, event: ChannelEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtmf_info_body_round_trips() {
        let digit = DtmfDigit { signal: '5', duration_ms: 160 };
        let body = digit.to_info_body();
        assert_eq!(DtmfDigit::from_info_body(&body), Some(digit));
    }

    #[test]
    fn auto_mode_resolves_by_peer_capability() {
        assert_eq!(DtmfMode::Auto.resolve(true), DtmfMode::Rfc2833);
        assert_eq!(DtmfMode::Auto.resolve(false), DtmfMode::Inband);
    }

    #[test]
    fn from_config_str_defaults_to_rfc2833() {
        assert_eq!(DtmfMode::from_config_str("bogus"), DtmfMode::Rfc2833);
        assert_eq!(DtmfMode::from_config_str("INFO"), DtmfMode::Info);
    }
}

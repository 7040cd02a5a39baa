//! RFC 3261 timer arithmetic (spec §4.4/§4.8). Transaction timers are a
//! thin typed wrapper over `infra_common::scheduler::Scheduler` rather than
//! a duplicated timer subsystem (spec §4.8 additions) -- callers schedule
//! with the durations computed here.

use std::time::Duration;

pub const T1: Duration = Duration::from_millis(500);
pub const T2: Duration = Duration::from_secs(4);

/// Timer B / Timer F: `64 * T1` (spec §4.4).
pub const TIMER_B: Duration = Duration::from_millis(500 * 64);
pub const TIMER_F: Duration = TIMER_B;

/// How long a server transaction absorbs retransmissions in `Completed`
/// after sending a final non-2xx response (spec §4.4: "32 s").
pub const TIMER_D_LIKE: Duration = Duration::from_secs(32);

/// Dialog autodestruct grace period after termination (spec §5, §8
/// invariant 4).
pub const DIALOG_AUTODESTRUCT: Duration = Duration::from_secs(32);

/// Next INVITE client retransmit interval after `attempt` retransmissions
/// already sent (spec §4.4: "retransmit at T1, 2*T1, 4*T1 ...").
pub fn invite_retransmit_delay(attempt: u32) -> Duration {
    T1 * 2u32.saturating_pow(attempt)
}

/// Next non-INVITE client retransmit interval: T1, then `min(2*previous,
/// T2)` (spec §4.4).
pub fn non_invite_retransmit_delay(previous: Duration) -> Duration {
    (previous * 2).min(T2)
}

/// Total sends (initial plus retransmits) before Timer B fires: `1 + 6`
/// doublings (spec §8 invariant 2: "<= 7 for INVITE").
pub fn max_invite_retransmits() -> u32 {
    let mut total = Duration::ZERO;
    let mut sends = 1; // the initial send
    let mut delay = T1;
    while total + delay <= TIMER_B {
        total += delay;
        delay *= 2;
        sends += 1;
    }
    sends
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_backoff_doubles() {
        assert_eq!(invite_retransmit_delay(0), Duration::from_millis(500));
        assert_eq!(invite_retransmit_delay(1), Duration::from_secs(1));
        assert_eq!(invite_retransmit_delay(2), Duration::from_secs(2));
    }

    #[test]
    fn non_invite_caps_at_t2() {
        assert_eq!(non_invite_retransmit_delay(Duration::from_secs(3)), Duration::from_secs(4));
        assert_eq!(non_invite_retransmit_delay(Duration::from_millis(500)), Duration::from_secs(1));
    }

    #[test]
    fn invite_retransmit_bound_is_seven() {
        assert_eq!(max_invite_retransmits(), 7);
    }
}

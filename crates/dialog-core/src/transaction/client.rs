//! Client transaction state machines (spec §4.4).

use std::time::Duration;

use super::timer::{invite_retransmit_delay, non_invite_retransmit_delay, T1, TIMER_B, TIMER_D_LIKE, TIMER_F};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteClientState {
    Calling,
    Proceeding,
    Completed,
    Terminated,
}

/// What the caller should do after feeding an event to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Nothing to send; wait for the next event or timer.
    None,
    /// Retransmit the original request after `delay`.
    ScheduleRetransmit(Duration),
    /// Deliver the provisional response to the dialog; retransmission stops.
    DeliverProvisional,
    /// Deliver the 2xx to the dialog. The dialog owns ACK generation and
    /// retransmission for 2xx responses (spec §9 ACK-on-2xx decision).
    Deliver2xx,
    /// Send an ACK from the transaction layer itself (same branch) for a
    /// non-2xx final response, then enter `Completed`.
    SendAckAndComplete,
    /// Timer B/F fired: deliver a synthesized timeout to the dialog.
    Timeout,
    /// The pending CANCEL can now be sent (a provisional just arrived).
    SendQueuedCancel,
}

/// INVITE client transaction (spec §4.4 "INVITE client"). Constructed on
/// the initial send; `on_response`/`on_timer_*` drive it forward.
#[derive(Debug, Clone)]
pub struct InviteClientTransaction {
    pub state: InviteClientState,
    retransmit_count: u32,
    elapsed: Duration,
    /// Set once a CANCEL has been requested before any provisional arrived
    /// (spec §4.4 "Cancellation": queued, dispatched on first 1xx).
    cancel_pending: bool,
    /// At least one provisional has been seen -- CANCEL may be sent
    /// immediately from here on (the "can-bye" flag).
    can_cancel: bool,
}

impl InviteClientTransaction {
    pub fn new() -> Self {
        InviteClientTransaction {
            state: InviteClientState::Calling,
            retransmit_count: 0,
            elapsed: Duration::ZERO,
            cancel_pending: false,
            can_cancel: false,
        }
    }

    /// First retransmit timer to arm right after the initial send.
    pub fn initial_retransmit_delay(&self) -> Duration {
        T1
    }

    pub fn timer_b(&self) -> Duration {
        TIMER_B
    }

    /// Request cancellation. Returns whether the CANCEL can be sent right
    /// now, or must wait for the first provisional (spec §4.4).
    pub fn request_cancel(&mut self) -> ClientAction {
        if self.can_cancel {
            ClientAction::None // caller sends CANCEL immediately
        } else {
            self.cancel_pending = true;
            ClientAction::None
        }
    }

    /// Called when a previously scheduled retransmit timer fires: marks
    /// that retransmission as sent and returns the delay for the *next*
    /// one (spec §4.4: "T1, 2*T1, 4*T1 ..."), or `Timeout` once the total
    /// elapsed time reaches Timer B.
    pub fn on_retransmit_timer(&mut self) -> ClientAction {
        match self.state {
            InviteClientState::Calling => {
                self.retransmit_count += 1;
                self.elapsed += invite_retransmit_delay(self.retransmit_count - 1);
                if self.elapsed >= TIMER_B {
                    self.state = InviteClientState::Terminated;
                    ClientAction::Timeout
                } else {
                    ClientAction::ScheduleRetransmit(invite_retransmit_delay(self.retransmit_count))
                }
            }
            _ => ClientAction::None,
        }
    }

    pub fn on_timer_b(&mut self) -> ClientAction {
        if matches!(self.state, InviteClientState::Calling) {
            self.state = InviteClientState::Terminated;
            ClientAction::Timeout
        } else {
            ClientAction::None
        }
    }

    /// Feed a received response. `status` is the numeric status code.
    pub fn on_response(&mut self, status: u16) -> ClientAction {
        match self.state {
            InviteClientState::Calling | InviteClientState::Proceeding => {
                if (100..200).contains(&status) {
                    let was_calling = self.state == InviteClientState::Calling;
                    self.state = InviteClientState::Proceeding;
                    let cancel_now = was_calling && self.cancel_pending;
                    self.can_cancel = true;
                    self.cancel_pending = false;
                    if cancel_now {
                        ClientAction::SendQueuedCancel
                    } else {
                        ClientAction::DeliverProvisional
                    }
                } else if (200..300).contains(&status) {
                    self.state = InviteClientState::Terminated;
                    ClientAction::Deliver2xx
                } else {
                    self.state = InviteClientState::Completed;
                    ClientAction::SendAckAndComplete
                }
            }
            InviteClientState::Completed => {
                // Retransmitted non-2xx final: re-ACK, stay Completed.
                if !(200..300).contains(&status) {
                    ClientAction::SendAckAndComplete
                } else {
                    ClientAction::None
                }
            }
            InviteClientState::Terminated => ClientAction::None,
        }
    }

    /// `Completed` absorbs retransmissions for 32s before self-destructing.
    pub fn completed_timeout(&self) -> Duration {
        TIMER_D_LIKE
    }

    pub fn on_completed_timeout(&mut self) {
        if matches!(self.state, InviteClientState::Completed) {
            self.state = InviteClientState::Terminated;
        }
    }
}

impl Default for InviteClientTransaction {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonInviteClientState {
    Trying,
    Proceeding,
    Completed,
    Terminated,
}

/// Non-INVITE client transaction (spec §4.4: "retransmit at T1 then
/// `min(2*previous, T2)` until final or Timer F").
#[derive(Debug, Clone)]
pub struct NonInviteClientTransaction {
    pub state: NonInviteClientState,
    last_delay: Duration,
    elapsed: Duration,
}

impl NonInviteClientTransaction {
    pub fn new() -> Self {
        NonInviteClientTransaction { state: NonInviteClientState::Trying, last_delay: T1, elapsed: Duration::ZERO }
    }

    pub fn initial_retransmit_delay(&self) -> Duration {
        T1
    }

    pub fn timer_f(&self) -> Duration {
        TIMER_F
    }

    pub fn on_retransmit_timer(&mut self) -> ClientAction {
        match self.state {
            NonInviteClientState::Trying | NonInviteClientState::Proceeding => {
                let delay = non_invite_retransmit_delay(self.last_delay);
                self.last_delay = delay;
                self.elapsed += delay;
                if self.elapsed >= TIMER_F {
                    self.state = NonInviteClientState::Terminated;
                    ClientAction::Timeout
                } else {
                    ClientAction::ScheduleRetransmit(delay)
                }
            }
            _ => ClientAction::None,
        }
    }

    pub fn on_timer_f(&mut self) -> ClientAction {
        if !matches!(self.state, NonInviteClientState::Completed | NonInviteClientState::Terminated) {
            self.state = NonInviteClientState::Terminated;
            ClientAction::Timeout
        } else {
            ClientAction::None
        }
    }

    pub fn on_response(&mut self, status: u16) -> ClientAction {
        match self.state {
            NonInviteClientState::Trying | NonInviteClientState::Proceeding => {
                if (100..200).contains(&status) {
                    self.state = NonInviteClientState::Proceeding;
                    ClientAction::DeliverProvisional
                } else {
                    self.state = NonInviteClientState::Completed;
                    ClientAction::Deliver2xx
                }
            }
            _ => ClientAction::None,
        }
    }
}

impl Default for NonInviteClientTransaction {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_client_stops_retransmitting_on_provisional() {
        let mut tx = InviteClientTransaction::new();
        assert_eq!(tx.on_response(180), ClientAction::DeliverProvisional);
        assert_eq!(tx.state, InviteClientState::Proceeding);
    }

    #[test]
    fn invite_client_2xx_is_terminal_and_dialog_owned() {
        let mut tx = InviteClientTransaction::new();
        assert_eq!(tx.on_response(200), ClientAction::Deliver2xx);
        assert_eq!(tx.state, InviteClientState::Terminated);
    }

    #[test]
    fn invite_client_non_2xx_triggers_transaction_ack() {
        let mut tx = InviteClientTransaction::new();
        assert_eq!(tx.on_response(486), ClientAction::SendAckAndComplete);
        assert_eq!(tx.state, InviteClientState::Completed);
        // retransmitted final also re-acks
        assert_eq!(tx.on_response(486), ClientAction::SendAckAndComplete);
    }

    #[test]
    fn cancel_before_provisional_is_queued_then_dispatched() {
        let mut tx = InviteClientTransaction::new();
        tx.request_cancel();
        assert_eq!(tx.on_response(180), ClientAction::SendQueuedCancel);
    }

    #[test]
    fn cancel_after_provisional_is_immediate() {
        let mut tx = InviteClientTransaction::new();
        tx.on_response(180);
        assert_eq!(tx.request_cancel(), ClientAction::None); // caller sends right away
    }

    #[test]
    fn invite_client_retransmit_schedule_matches_spec_and_bounds_at_seven_sends() {
        let mut tx = InviteClientTransaction::new();
        let mut sends = 1; // initial send
        loop {
            match tx.on_retransmit_timer() {
                ClientAction::ScheduleRetransmit(_) => sends += 1,
                ClientAction::Timeout => break,
                other => panic!("unexpected action: {other:?}"),
            }
        }
        assert_eq!(sends, 7);
        assert_eq!(tx.state, InviteClientState::Terminated);
    }

    #[test]
    fn non_invite_client_backoff_caps_at_t2() {
        let mut tx = NonInviteClientTransaction::new();
        assert_eq!(tx.on_retransmit_timer(), ClientAction::ScheduleRetransmit(Duration::from_secs(1)));
        assert_eq!(tx.on_retransmit_timer(), ClientAction::ScheduleRetransmit(Duration::from_secs(2)));
        assert_eq!(tx.on_retransmit_timer(), ClientAction::ScheduleRetransmit(Duration::from_secs(4)));
        assert_eq!(tx.on_retransmit_timer(), ClientAction::ScheduleRetransmit(Duration::from_secs(4)));
    }
}

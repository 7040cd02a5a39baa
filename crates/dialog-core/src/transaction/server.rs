//! Server transaction state machines (spec §4.4).

use std::time::Duration;

use super::timer::TIMER_D_LIKE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteServerState {
    Proceeding,
    /// Waiting for ACK after a 2xx; the *dialog* owns retransmission here
    /// per spec §9's ACK-on-2xx decision, so this state only tracks that
    /// the final answer went out.
    Accepted,
    /// Waiting for ACK after a non-2xx final; the transaction layer
    /// retransmits the final itself until ACK or 32s.
    Completed,
    Confirmed,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    None,
    /// Re-send the last provisional/final (retransmitted request absorbed).
    Resend,
    /// Retransmit the non-2xx final response after `delay`.
    ScheduleFinalRetransmit(Duration),
    Terminate,
}

/// INVITE server transaction (spec §4.4 "INVITE server").
#[derive(Debug, Clone)]
pub struct InviteServerTransaction {
    pub state: InviteServerState,
    pub last_status: Option<u16>,
}

impl InviteServerTransaction {
    pub fn new() -> Self {
        InviteServerTransaction { state: InviteServerState::Proceeding, last_status: None }
    }

    /// A duplicate request arrived (network retransmit of the original
    /// INVITE): re-send whatever we last sent.
    pub fn on_duplicate_request(&self) -> ServerAction {
        match self.state {
            InviteServerState::Proceeding | InviteServerState::Completed => ServerAction::Resend,
            _ => ServerAction::None,
        }
    }

    /// Application sent a response with this status code.
    pub fn on_response_sent(&mut self, status: u16) -> ServerAction {
        self.last_status = Some(status);
        if (100..200).contains(&status) {
            self.state = InviteServerState::Proceeding;
            ServerAction::None
        } else if (200..300).contains(&status) {
            self.state = InviteServerState::Accepted;
            ServerAction::None
        } else {
            self.state = InviteServerState::Completed;
            ServerAction::ScheduleFinalRetransmit(super::timer::T1)
        }
    }

    pub fn on_final_retransmit_timer(&mut self, previous: Duration) -> ServerAction {
        match self.state {
            InviteServerState::Completed => {
                let next = super::timer::non_invite_retransmit_delay(previous);
                ServerAction::ScheduleFinalRetransmit(next)
            }
            _ => ServerAction::None,
        }
    }

    pub fn on_ack(&mut self) -> ServerAction {
        match self.state {
            InviteServerState::Completed => {
                self.state = InviteServerState::Confirmed;
                ServerAction::None
            }
            InviteServerState::Accepted => {
                // ACK for a 2xx: dialog already handled it, transaction just closes.
                self.state = InviteServerState::Terminated;
                ServerAction::Terminate
            }
            _ => ServerAction::None,
        }
    }

    /// Timer I/H-equivalent grace period (spec uses a flat 32s grace for
    /// both client and server absorbing windows).
    pub fn completed_timeout(&self) -> Duration {
        TIMER_D_LIKE
    }

    pub fn on_completed_timeout(&mut self) -> ServerAction {
        if matches!(self.state, InviteServerState::Completed | InviteServerState::Confirmed) {
            self.state = InviteServerState::Terminated;
            ServerAction::Terminate
        } else {
            ServerAction::None
        }
    }
}

impl Default for InviteServerTransaction {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonInviteServerState {
    Trying,
    Proceeding,
    Completed,
    Terminated,
}

/// Non-INVITE server transaction (spec §4.4: "absorb retransmissions;
/// re-send last provisional/final for the life of the transaction").
#[derive(Debug, Clone)]
pub struct NonInviteServerTransaction {
    pub state: NonInviteServerState,
    pub last_status: Option<u16>,
}

impl NonInviteServerTransaction {
    pub fn new() -> Self {
        NonInviteServerTransaction { state: NonInviteServerState::Trying, last_status: None }
    }

    pub fn on_duplicate_request(&self) -> ServerAction {
        match self.state {
            NonInviteServerState::Proceeding | NonInviteServerState::Completed => ServerAction::Resend,
            _ => ServerAction::None,
        }
    }

    pub fn on_response_sent(&mut self, status: u16) -> ServerAction {
        self.last_status = Some(status);
        if (100..200).contains(&status) {
            self.state = NonInviteServerState::Proceeding;
        } else {
            self.state = NonInviteServerState::Completed;
        }
        ServerAction::None
    }

    pub fn completed_timeout(&self) -> Duration {
        TIMER_D_LIKE
    }

    pub fn on_completed_timeout(&mut self) -> ServerAction {
        if matches!(self.state, NonInviteServerState::Completed) {
            self.state = NonInviteServerState::Terminated;
            ServerAction::Terminate
        } else {
            ServerAction::None
        }
    }
}

impl Default for NonInviteServerTransaction {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_server_completed_retransmits_final_until_ack() {
        let mut tx = InviteServerTransaction::new();
        assert_eq!(tx.on_response_sent(486), ServerAction::ScheduleFinalRetransmit(Duration::from_millis(500)));
        assert_eq!(tx.state, InviteServerState::Completed);
        assert_eq!(tx.on_ack(), ServerAction::None);
        assert_eq!(tx.state, InviteServerState::Confirmed);
    }

    #[test]
    fn invite_server_2xx_leaves_ack_handling_to_dialog() {
        let mut tx = InviteServerTransaction::new();
        assert_eq!(tx.on_response_sent(200), ServerAction::None);
        assert_eq!(tx.state, InviteServerState::Accepted);
        assert_eq!(tx.on_ack(), ServerAction::Terminate);
    }

    #[test]
    fn non_invite_server_duplicate_resends_last_response() {
        let mut tx = NonInviteServerTransaction::new();
        tx.on_response_sent(200);
        assert_eq!(tx.on_duplicate_request(), ServerAction::Resend);
    }
}

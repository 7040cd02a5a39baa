//! Drives an outbound client transaction to completion (spec §4.4's UAC
//! side): retransmission on the schedule `on_retransmit_timer` computes,
//! the Timer B/F backstop, and `CANCEL`, mirroring
//! [`Engine::schedule_invite_retransmit`]'s scheduler-driven style for the
//! UAS side rather than a bare send-then-wait.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use sipswitch_dialog_core::transaction::timer::{TIMER_B, TIMER_F};
use sipswitch_dialog_core::transaction::{ClientAction, InviteClientState, InviteClientTransaction, NonInviteClientTransaction, Transaction, TransactionKey};
use sipswitch_infra_common::scheduler::Outcome;
use sipswitch_sip_core::message::{Message, Request};

use super::{Engine, ResponseOutcome};

/// Which client state machine to drive (spec §4.4: INVITE and non-INVITE
/// have distinct retransmit/timeout arithmetic).
#[derive(Debug, Clone, Copy)]
pub(crate) enum ClientKind {
    Invite,
    NonInvite,
}

impl Engine {
    /// Send `req` to `dest` and drive it through a real client
    /// transaction instead of a bare send-then-wait: retransmit on
    /// `on_retransmit_timer`'s schedule, and give up after `deadline` (the
    /// caller's notion of "no answer" -- Timer B/F for REGISTER/transfer,
    /// the configured `qualify` threshold for OPTIONS pokes). An
    /// independent Timer B/F backstop also runs so a transaction parked in
    /// `Proceeding` after a provisional (no further retransmits to drive
    /// it) still terminates on its own.
    pub(crate) async fn drive_client_transaction(
        self: &Arc<Self>,
        key: TransactionKey,
        call_id: String,
        req: Request,
        dest: SocketAddr,
        kind: ClientKind,
        deadline: Duration,
    ) -> Option<ResponseOutcome> {
        let initial = match kind {
            ClientKind::Invite => Transaction::InviteClient(InviteClientTransaction::new()),
            ClientKind::NonInvite => Transaction::NonInviteClient(NonInviteClientTransaction::new()),
        };
        if self.transactions.insert(key.clone(), initial).is_err() {
            return None;
        }
        self.outbound_transactions.insert(key.clone(), (req.clone(), dest));

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.response_waiters.insert(call_id.clone(), tx);

        if let Err(e) = self.send_message(&Message::Request(req.clone()), dest).await {
            warn!(%call_id, error = %e, "failed to send outbound request");
            self.response_waiters.remove(&call_id);
            self.outbound_transactions.remove(&key);
            self.transactions.remove(&key);
            return None;
        }

        let retransmit_delay = self
            .transactions
            .with_mut(&key, |tx| match tx {
                Transaction::InviteClient(t) => t.initial_retransmit_delay(),
                Transaction::NonInviteClient(t) => t.initial_retransmit_delay(),
                _ => sipswitch_dialog_core::transaction::timer::T1,
            })
            .unwrap_or(sipswitch_dialog_core::transaction::timer::T1);

        let retransmit_id = {
            let engine = self.clone();
            let key = key.clone();
            let req = req.clone();
            let call_id = call_id.clone();
            self.scheduler.add(retransmit_delay, move || {
                let action = engine.transactions.with_mut(&key, |tx| match tx {
                    Transaction::InviteClient(t) => t.on_retransmit_timer(),
                    Transaction::NonInviteClient(t) => t.on_retransmit_timer(),
                    _ => ClientAction::None,
                });
                match action {
                    Some(ClientAction::ScheduleRetransmit(delay)) => {
                        let engine = engine.clone();
                        let req = req.clone();
                        tokio::spawn(async move {
                            let _ = engine.send_message(&Message::Request(req), dest).await;
                        });
                        Outcome::Reschedule(delay)
                    }
                    Some(ClientAction::Timeout) => {
                        if let Some((_, tx)) = engine.response_waiters.remove(&call_id) {
                            let _ = tx.send(ResponseOutcome::Timeout);
                        }
                        Outcome::Done
                    }
                    _ => Outcome::Done,
                }
            })
        };

        let backstop_delay = match kind {
            ClientKind::Invite => TIMER_B,
            ClientKind::NonInvite => TIMER_F,
        };
        let backstop_id = {
            let engine = self.clone();
            let key = key.clone();
            let call_id = call_id.clone();
            self.scheduler.add(backstop_delay, move || {
                let action = engine.transactions.with_mut(&key, |tx| match tx {
                    Transaction::InviteClient(t) => t.on_timer_b(),
                    Transaction::NonInviteClient(t) => t.on_timer_f(),
                    _ => ClientAction::None,
                });
                if matches!(action, Some(ClientAction::Timeout)) {
                    if let Some((_, tx)) = engine.response_waiters.remove(&call_id) {
                        let _ = tx.send(ResponseOutcome::Timeout);
                    }
                }
                Outcome::Done
            })
        };

        let outcome = tokio::time::timeout(deadline, rx).await.ok().and_then(|r| r.ok());

        self.scheduler.del(retransmit_id);
        self.scheduler.del(backstop_id);
        self.response_waiters.remove(&call_id);
        self.outbound_transactions.remove(&key);
        self.transactions.remove(&key);

        outcome
    }

    /// Request cancellation of an outstanding client INVITE transaction
    /// (spec §4.4 "Cancellation"): sends the `CANCEL` immediately if a
    /// provisional has already arrived, otherwise queues it on the
    /// transaction itself -- [`super::responses::Engine::handle_response`]'s
    /// `SendQueuedCancel` handling sends it on the first 1xx.
    pub(crate) async fn cancel_client_invite(self: &Arc<Self>, key: &TransactionKey) {
        let must_wait_for_provisional = self
            .transactions
            .with_mut(key, |tx| match tx {
                Transaction::InviteClient(t) => {
                    t.request_cancel();
                    t.state != InviteClientState::Proceeding
                }
                _ => true,
            })
            .unwrap_or(true);
        if !must_wait_for_provisional {
            self.send_cancel_for(key).await;
        }
    }

    /// Build and send the `CANCEL` for the outstanding request at `key`,
    /// using the original request/destination stashed when the
    /// transaction was started.
    pub(crate) async fn send_cancel_for(&self, key: &TransactionKey) {
        let Some((original, dest)) = self.outbound_transactions.get(key).map(|e| e.value().clone()) else {
            return;
        };
        let cancel = crate::wire::build_cancel(&original);
        let _ = self.send_message(&Message::Request(cancel), dest).await;
    }
}

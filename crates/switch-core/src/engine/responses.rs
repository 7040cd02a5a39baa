//! Inbound response handling: drives the matching outbound client
//! transaction (spec §4.4) via [`super::client_transaction`], resolves
//! outstanding transactions started from this engine (pokes, REGISTER,
//! transfer INVITE) by fulfilling the matching [`super::ResponseOutcome`]
//! waiter, and stashes challenge headers so [`super::registration`]'s
//! retry-with-auth flow can read them back.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::debug;

use sipswitch_dialog_core::transaction::{ClientAction, Transaction, TransactionKey};
use sipswitch_sip_core::headers::HeaderName;
use sipswitch_sip_core::message::{Message, Response};

use crate::error::Result;
use crate::wire;

use super::{Engine, ResponseOutcome};

impl Engine {
    pub(crate) async fn handle_response(self: &Arc<Self>, resp: Response, _source: SocketAddr) -> Result<()> {
        let Some(call_id) = wire::call_id(&resp.headers) else {
            return Ok(());
        };

        if resp.status.0 == 401 || resp.status.0 == 407 {
            let name = if resp.status.0 == 401 { HeaderName::WwwAuthenticate } else { HeaderName::ProxyAuthenticate };
            if let Some(value) = resp.headers.get(&name) {
                self.pending_challenges.insert(call_id.clone(), value.to_string());
            }
        }

        let Some(key) = client_key_for(&resp) else {
            debug!(%call_id, status = resp.status.0, "response carries no CSeq/branch, cannot match a client transaction");
            return Ok(());
        };

        let Some(action) = self.transactions.with_mut(&key, |tx| match tx {
            Transaction::InviteClient(t) => t.on_response(resp.status.0),
            Transaction::NonInviteClient(t) => t.on_response(resp.status.0),
            _ => ClientAction::None,
        }) else {
            debug!(%call_id, status = resp.status.0, "response for an unknown or already-finished client transaction");
            return Ok(());
        };

        let expires = resp.headers.get(&HeaderName::Expires).and_then(|v| v.trim().parse().ok());

        match action {
            ClientAction::DeliverProvisional => {
                debug!(%call_id, status = resp.status.0, "provisional response");
            }
            ClientAction::Deliver2xx => {
                if let Some((_, tx)) = self.response_waiters.remove(&call_id) {
                    let _ = tx.send(ResponseOutcome::Final { status: resp.status.0, expires });
                }
            }
            ClientAction::SendAckAndComplete => {
                self.send_client_ack(&key, &resp).await;
                if let Some((_, tx)) = self.response_waiters.remove(&call_id) {
                    let _ = tx.send(ResponseOutcome::Final { status: resp.status.0, expires });
                }
            }
            ClientAction::SendQueuedCancel => {
                self.send_cancel_for(&key).await;
            }
            ClientAction::Timeout | ClientAction::None | ClientAction::ScheduleRetransmit(_) => {}
        }

        Ok(())
    }

    async fn send_client_ack(&self, key: &TransactionKey, resp: &Response) {
        let Some((original, dest)) = self.outbound_transactions.get(key).map(|e| e.value().clone()) else {
            return;
        };
        let ack = wire::build_client_ack(&original, resp);
        let _ = self.send_message(&Message::Request(ack), dest).await;
    }
}

/// Reconstruct the originating client [`TransactionKey`] from a response:
/// `(branch, method, Call-ID, CSeq)`, all copied verbatim from the request
/// a well-behaved UAS echoes back (spec §3's dual keying scheme).
fn client_key_for(resp: &Response) -> Option<TransactionKey> {
    let call_id = wire::call_id(&resp.headers)?;
    let cseq = wire::cseq_number(&resp.headers)?;
    let method = wire::cseq_method(&resp.headers)?;
    let branch = wire::topmost_branch(&resp.headers);
    Some(TransactionKey::client(branch, method, call_id, cseq))
}

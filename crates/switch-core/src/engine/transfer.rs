//! REFER/transfer handling (spec §4.5 "Transfers", spec §8 S6): the
//! `202 Accepted` + progress-`NOTIFY` flow, dispatched to a blind
//! destination or bridged with an attended `Replaces=` target dialog.
//!
//! Media bridging between the two legs is a host/channel-layer concern
//! (spec §1 Non-goals: no media plane in this crate); this module's job
//! ends at signaling the transfer outcome and tearing down the legs it
//! replaces.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use sipswitch_dialog_core::dialog::transfer::{classify_transfer, parse_refer_to, sipfrag_body, TransferKind};
use sipswitch_dialog_core::dialog::DialogId;
use sipswitch_dialog_core::transaction::{timer::TIMER_B, TransactionKey};
use sipswitch_sip_core::headers::HeaderName;
use sipswitch_sip_core::message::{Message, Request};
use sipswitch_sip_core::prelude::Method;

use crate::cause;
use crate::channel::ChannelEvent;
use crate::error::Result;
use crate::wire;

use super::{ClientKind, Engine, ResponseOutcome};

impl Engine {
    pub(crate) async fn handle_refer(self: &Arc<Self>, req: Request, source: SocketAddr) -> Result<()> {
        let call_id = wire::call_id(&req.headers).unwrap_or_default();

        let Some(refer_to) = req.headers.get(&HeaderName::ReferTo) else {
            let resp = wire::build_response(&req, 400, None, Vec::new());
            self.send_message(&Message::Response(resp), source).await?;
            return Ok(());
        };
        let refer_target = match parse_refer_to(refer_to) {
            Ok(t) => t,
            Err(_) => {
                let resp = wire::build_response(&req, 400, None, Vec::new());
                self.send_message(&Message::Response(resp), source).await?;
                return Ok(());
            }
        };

        let to_tag = wire::new_tag();
        let accepted = wire::build_response(&req, 202, Some(&to_tag), Vec::new());
        self.send_message(&Message::Response(accepted), source).await?;

        let kind = classify_transfer(&refer_target, |id: &DialogId| self.dialogs.get(&id.call_id).is_some());

        self.send_refer_notify(&call_id, source, "100 Trying", false).await;

        match kind {
            TransferKind::Blind { destination } => {
                self.run_blind_transfer(call_id, destination, source).await;
            }
            TransferKind::Attended { target_dialog } => {
                self.run_attended_transfer(call_id, target_dialog, source).await;
            }
        }
        Ok(())
    }

    /// Originate a fresh INVITE to `destination` on behalf of the
    /// referring dialog's peer; on success, tear down the referring
    /// dialog (its peer has been handed off) and report `200 OK` on the
    /// subscription; on failure, report the failing status and leave the
    /// referring dialog intact.
    async fn run_blind_transfer(self: &Arc<Self>, call_id: String, destination: sipswitch_sip_core::uri::Uri, source: SocketAddr) {
        let new_call_id = format!("xfer-{}-{}", call_id, self.next_origin_id());
        let local_tag = wire::new_tag();
        let from = format!("<sip:transfer@{}>;tag={}", self.advertised_host(), local_tag);
        let to = format!("<{destination}>");
        let req = wire::build_request(Method::Invite, destination, &new_call_id, &from, &to, 1, &self.advertised_host(), self.local_port());

        let branch = wire::topmost_branch(&req.headers);
        let key = TransactionKey::client(branch, Method::Invite, new_call_id.clone(), 1);
        self.outbound_transfers.insert(call_id.clone(), key.clone());

        let outcome = self.drive_client_transaction(key, new_call_id.clone(), req, source, ClientKind::Invite, TIMER_B).await;
        self.outbound_transfers.remove(&call_id);

        match outcome {
            Some(ResponseOutcome::Final { status, .. }) if (200..300).contains(&status) => {
                info!(%call_id, new_call_id = %new_call_id, "blind transfer target answered");
                self.send_refer_notify(&call_id, source, "200 OK", true).await;
                self.terminate_dialog(&call_id, source, cause::cause_for_status(200)).await;
            }
            Some(ResponseOutcome::Final { status, .. }) => {
                warn!(%call_id, status, "blind transfer target rejected");
                self.send_refer_notify(&call_id, source, &format!("{status} transfer failed"), true).await;
            }
            _ => {
                warn!(%call_id, "blind transfer timed out");
                self.send_refer_notify(&call_id, source, "408 Request Timeout", true).await;
            }
        }
    }

    /// Bridge by tearing down both the referring dialog and the
    /// `Replaces=` target it named, reporting success on the subscription
    /// (spec §4.5: attended transfer via a locally-found `Replaces=`
    /// dialog).
    async fn run_attended_transfer(self: &Arc<Self>, call_id: String, target_dialog: DialogId, source: SocketAddr) {
        if self.dialogs.get(&target_dialog.call_id).is_none() {
            warn!(%call_id, target = %target_dialog.call_id, "attended transfer target dialog vanished");
            self.send_refer_notify(&call_id, source, "404 Not Found", true).await;
            return;
        }

        self.send_refer_notify(&call_id, source, "200 OK", true).await;
        self.terminate_dialog(&call_id, source, cause::cause_for_status(200)).await;
        self.terminate_dialog(&target_dialog.call_id, source, cause::cause_for_status(200)).await;
        info!(%call_id, target = %target_dialog.call_id, "attended transfer bridged and torn down");
    }

    async fn terminate_dialog(&self, call_id: &str, source: SocketAddr, cause: cause::HangupCause) {
        let Some(handle) = self.dialogs.get(call_id) else { return };
        let mut dialog = handle.lock().await;
        if matches!(dialog.state, sipswitch_dialog_core::dialog::DialogState::Terminated) {
            return;
        }
        let remote_target = dialog.remote_target.clone();
        let local_uri = dialog.local_uri.clone();
        let remote_uri = dialog.remote_uri.clone();
        let local_tag = dialog.id.local_tag.clone();
        let cseq = dialog.next_local_cseq();
        dialog.terminate();
        drop(dialog);

        self.cancel_invite_retransmit(call_id);
        self.call_slots.remove(call_id);
        self.pending_invites.remove(call_id);

        let from = format!("<{local_uri}>;tag={local_tag}");
        let to = format!("<{remote_uri}>");
        let bye = wire::build_request(Method::Bye, remote_target, call_id, &from, &to, cseq, &self.advertised_host(), self.local_port());
        let _ = self.send_message(&Message::Request(bye), source).await;

        self.deps.channel.dispatch(call_id, ChannelEvent::HangupWithCause { cause }).await;
    }

    /// Send an in-dialog `NOTIFY` carrying a `message/sipfrag` progress
    /// report on the REFER's implicit subscription (spec §4.5).
    async fn send_refer_notify(&self, call_id: &str, source: SocketAddr, status_line: &str, terminate_subscription: bool) {
        let Some(handle) = self.dialogs.get(call_id) else { return };
        let mut dialog = handle.lock().await;
        let cseq = dialog.next_local_cseq();
        let local_uri = dialog.local_uri.clone();
        let remote_uri = dialog.remote_uri.clone();
        let remote_target = dialog.remote_target.clone();
        drop(dialog);

        let from = format!("<{local_uri}>");
        let to = format!("<{remote_uri}>");
        let mut notify = wire::build_request(Method::Notify, remote_target, call_id, &from, &to, cseq, &self.advertised_host(), self.local_port());
        notify.headers.push(HeaderName::Event, "refer");
        notify.headers.push(
            HeaderName::SubscriptionState,
            if terminate_subscription { "terminated;reason=noresource".to_string() } else { "active".to_string() },
        );
        notify.headers.push(HeaderName::ContentType, "message/sipfrag");
        notify.body = sipfrag_body(status_line).into_bytes();
        notify.headers.push(HeaderName::ContentLength, notify.body.len().to_string());

        let _ = self.send_message(&Message::Request(notify), source).await;
    }
}

//! Inbound request handling (spec §4.4/§4.5): method-capability dispatch,
//! the digest gate shared by REGISTER and secured peers, SDP offer/answer
//! for INVITE/re-INVITE, and the error-code mapping spec §7 lays out.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use sipswitch_dialog_core::dialog::{self, Dialog, DialogState, DlgError};
use sipswitch_dialog_core::transaction::{InviteServerTransaction, ServerAction, Transaction, TransactionKey};
use sipswitch_sip_core::headers::{split_scheme, AuthParams, HeaderName};
use sipswitch_sip_core::message::{Message, Request, Response};
use sipswitch_sip_core::method::Method;
use sipswitch_sip_core::sdp::{self, LocalCapabilities, SdpSession, UdpEc};
use sipswitch_sip_transport::Transport;

use crate::cause;
use crate::channel::ChannelEvent;
use crate::error::Result;
use crate::wire;

use super::Engine;

/// The `application/sdp` body of a request, ignoring the `multipart/mixed`
/// case (rare for this engine's peers; [`sipswitch_sip_core::message::Message::sdp_body`]
/// covers it for messages already wrapped in [`Message`]).
fn extract_sdp(req: &Request) -> Option<&[u8]> {
    let ct = req.headers.get(&HeaderName::ContentType)?;
    if ct.trim().eq_ignore_ascii_case("application/sdp") {
        Some(&req.body)
    } else {
        None
    }
}

fn unsupported_tags(req: &Request) -> Vec<String> {
    match req.headers.get(&HeaderName::Require) {
        Some(v) => dialog::unsupported_required_tags(v.split(',').map(str::trim)),
        None => Vec::new(),
    }
}

impl Engine {
    pub(crate) async fn handle_request(self: &Arc<Self>, req: Request, source: SocketAddr) -> Result<()> {
        match req.method {
            Method::Invite => {
                if wire::to_tag(&req.headers).is_some() {
                    self.handle_reinvite(req, source).await
                } else {
                    self.handle_new_invite(req, source).await
                }
            }
            Method::Ack => self.handle_ack(req, source).await,
            Method::Cancel => self.handle_cancel(req, source).await,
            Method::Bye => self.handle_bye(req, source).await,
            Method::Options => self.handle_options(req, source).await,
            Method::Register => self.handle_register_request(req, source).await,
            Method::Refer => self.handle_refer(req, source).await,
            Method::Subscribe => self.handle_subscribe(req, source).await,
            Method::Notify => self.handle_notify(req, source).await,
            _ => self.reject_unknown_method(req, source).await,
        }
    }

    /// Verify the request's `Authorization` header against `realm`,
    /// challenging (`401`) if it is absent, stale, or wrong (spec §4.6).
    /// `None` means the request passed and processing should continue.
    async fn digest_gate(self: &Arc<Self>, req: &Request, realm: &str, txn_key: &str) -> Option<Response> {
        let auth_header = req.headers.get(&HeaderName::Authorization).map(str::to_string);
        let verify_result = match &auth_header {
            Some(raw) => {
                let (_scheme, rest) = split_scheme(raw);
                let params = AuthParams::parse(rest);
                Some(self.auth.verify(realm, req.method.as_str(), txn_key, &params).await)
            }
            None => None,
        };
        let stale = matches!(verify_result, Some(Err(sipswitch_auth_core::Error::StaleNonce)));
        match verify_result {
            Some(Ok(())) => None,
            _ => {
                let challenge = self.auth.challenge(realm, stale);
                let resp = wire::build_response(req, 401, None, Vec::new());
                Some(wire::with_header(resp, HeaderName::WwwAuthenticate, challenge.to_header_value()))
            }
        }
    }

    /// Build a response to an INVITE server transaction, record it for
    /// retransmission/duplicate-absorption, and drive the transaction's
    /// state (spec §4.4).
    fn finish_invite_response(&self, req: &Request, key: &TransactionKey, status: u16, to_tag: Option<&str>, body: Vec<u8>) -> Response {
        let resp = wire::build_response(req, status, to_tag, body);
        let bytes = wire::message_bytes(&Message::Response(resp.clone()));
        self.last_responses.insert(key.clone(), bytes);
        self.transactions.with_mut(key, |tx| {
            if let Transaction::InviteServer(t) = tx {
                let _ = t.on_response_sent(status);
            }
        });
        resp
    }

    /// Send a final INVITE response and arm the dialog-owned retransmit
    /// timer (spec §9: the transaction layer leaves retransmitting a final
    /// response to the dialog; this applies equally to 2xx and error
    /// finals, both of which need retransmission until ACK).
    async fn respond_final_invite(self: &Arc<Self>, req: &Request, key: &TransactionKey, call_id: &str, status: u16, to_tag: Option<&str>, body: Vec<u8>, source: SocketAddr) -> Result<()> {
        let resp = self.finish_invite_response(req, key, status, to_tag, body);
        self.send_message(&Message::Response(resp.clone()), source).await?;
        self.schedule_invite_retransmit(call_id.to_string(), resp, source);
        Ok(())
    }

    async fn handle_new_invite(self: &Arc<Self>, req: Request, source: SocketAddr) -> Result<()> {
        let call_id = wire::call_id(&req.headers).unwrap_or_default();
        let branch = wire::topmost_branch(&req.headers);
        let key = TransactionKey::server(branch, Method::Invite);

        if self.transactions.contains(&key) {
            let action = self.transactions.with_mut(&key, |tx| match tx {
                Transaction::InviteServer(t) => t.on_duplicate_request(),
                _ => ServerAction::None,
            });
            if matches!(action, Some(ServerAction::Resend)) {
                if let Some(bytes) = self.last_responses.get(&key) {
                    let _ = self.transport.send_to(bytes.value(), source).await;
                }
            }
            return Ok(());
        }
        let _ = self.transactions.insert(key.clone(), Transaction::InviteServer(InviteServerTransaction::new()));

        let local_tag = wire::new_tag();

        let tags = unsupported_tags(&req);
        if !tags.is_empty() {
            let resp = wire::with_header(
                self.finish_invite_response(&req, &key, 420, Some(&local_tag), Vec::new()),
                HeaderName::Unsupported,
                tags.join(", "),
            );
            self.send_message(&Message::Response(resp.clone()), source).await?;
            self.schedule_invite_retransmit(call_id, resp, source);
            return Ok(());
        }

        let from_uri = wire::header_uri(req.headers.get(&HeaderName::From).unwrap_or_default());
        let to_uri = wire::header_uri(req.headers.get(&HeaderName::To).unwrap_or_default()).unwrap_or_else(|| req.uri.clone());
        let target_user = to_uri.user.clone().unwrap_or_default();

        let Some(account_name) = self.deps.outbound.resolve(&target_user).await else {
            return self.respond_final_invite(&req, &key, &call_id, 404, Some(&local_tag), Vec::new(), source).await;
        };
        let Some(info) = self.deps.accounts.lookup(&account_name).await else {
            return self.respond_final_invite(&req, &key, &call_id, 404, Some(&local_tag), Vec::new(), source).await;
        };
        if !self.deps.accounts.acl_permits(&info, &source.ip().to_string()) {
            return self.respond_final_invite(&req, &key, &call_id, 403, Some(&local_tag), Vec::new(), source).await;
        }
        if info.secret.is_some() {
            if let Some(challenge) = self.digest_gate(&req, &info.realm, &call_id).await {
                self.last_responses.insert(key.clone(), wire::message_bytes(&Message::Response(challenge.clone())));
                self.send_message(&Message::Response(challenge), source).await?;
                return Ok(());
            }
        }

        let Some(slot) = self.call_limiter.try_acquire(&account_name, info.call_limit) else {
            return self.respond_final_invite(&req, &key, &call_id, 480, Some(&local_tag), Vec::new(), source).await;
        };

        let local_caps = LocalCapabilities {
            audio_codecs: info.permitted_audio_codecs.clone(),
            video_enabled: info.video_enabled,
            t38_enabled: info.t38_enabled,
            t38_udp_ec_preference: info.t38_udp_ec_preference,
        };
        let offer = match extract_sdp(&req) {
            Some(body) => match sdp::parse_session(body) {
                Ok(s) => s,
                Err(_) => {
                    drop(slot);
                    return self.respond_final_invite(&req, &key, &call_id, 488, Some(&local_tag), Vec::new(), source).await;
                }
            },
            None => SdpSession::default(),
        };
        let plan = match sdp::negotiate(&offer, &local_caps) {
            Ok(p) => p,
            Err(_) => {
                drop(slot);
                return self.respond_final_invite(&req, &key, &call_id, 488, Some(&local_tag), Vec::new(), source).await;
            }
        };

        let remote_uri = from_uri.unwrap_or_else(|| req.uri.clone());
        let remote_tag = wire::from_tag(&req.headers).unwrap_or_default();
        let mut new_dialog = Dialog::new(call_id.clone(), to_uri, remote_uri, local_tag.clone(), remote_tag, false);
        new_dialog.invite_usage.media_plan = plan.clone();
        new_dialog.confirm();
        self.dialogs.insert(call_id.clone(), new_dialog);
        self.call_slots.insert(call_id.clone(), slot);
        self.pending_invites.insert(call_id.clone(), req.clone());

        let audio_port = self.deps.media_ports.allocate(&call_id).await;
        let video_port = if plan.video_codecs.is_empty() { None } else { Some(self.deps.media_ports.allocate(&call_id).await) };
        let t38_port = if plan.t38.is_some() { Some(self.deps.media_ports.allocate(&call_id).await) } else { None };
        let answer_sdp = sdp::serialize_session(&plan, &self.advertised_host(), audio_port, video_port, t38_port, self.next_origin_id());

        let ringing = self.finish_invite_response(&req, &key, 180, Some(&local_tag), Vec::new());
        self.send_message(&Message::Response(ringing), source).await?;
        self.deps.channel.dispatch(&call_id, ChannelEvent::Ringing).await;

        let ok_resp = self.finish_invite_response(&req, &key, 200, Some(&local_tag), answer_sdp.into_bytes());
        let ok_resp = wire::with_header(
            ok_resp,
            HeaderName::Contact,
            format!("<sip:{}@{}:{}>", target_user, self.advertised_host(), self.local_port()),
        );
        self.send_message(&Message::Response(ok_resp.clone()), source).await?;
        self.schedule_invite_retransmit(call_id.clone(), ok_resp, source);
        self.deps.channel.dispatch(&call_id, ChannelEvent::Answered { media_plan: plan }).await;

        Ok(())
    }

    async fn handle_reinvite(self: &Arc<Self>, req: Request, source: SocketAddr) -> Result<()> {
        let call_id = wire::call_id(&req.headers).unwrap_or_default();
        let branch = wire::topmost_branch(&req.headers);
        let key = TransactionKey::server(branch, Method::Invite);

        if self.transactions.contains(&key) {
            let action = self.transactions.with_mut(&key, |tx| match tx {
                Transaction::InviteServer(t) => t.on_duplicate_request(),
                _ => ServerAction::None,
            });
            if matches!(action, Some(ServerAction::Resend)) {
                if let Some(bytes) = self.last_responses.get(&key) {
                    let _ = self.transport.send_to(bytes.value(), source).await;
                }
            }
            return Ok(());
        }
        let _ = self.transactions.insert(key.clone(), Transaction::InviteServer(InviteServerTransaction::new()));

        let Some(handle) = self.dialogs.get(&call_id) else {
            return self.respond_final_invite(&req, &key, &call_id, 481, None, Vec::new(), source).await;
        };

        let mut dialog = handle.lock().await;
        if let Some(cseq) = wire::cseq_number(&req.headers) {
            if let Err(e) = dialog.observe_remote_cseq(cseq) {
                warn!(%call_id, error = ?e, "out-of-order re-INVITE CSeq");
            }
        }
        if dialog.begin_reinvite().is_err() {
            drop(dialog);
            return self.respond_final_invite(&req, &key, &call_id, 491, None, Vec::new(), source).await;
        }

        let account_name = dialog.local_uri.user.clone().unwrap_or_default();
        let info = self.deps.accounts.lookup(&account_name).await;
        let local_caps = match info {
            Some(i) => LocalCapabilities {
                audio_codecs: i.permitted_audio_codecs,
                video_enabled: i.video_enabled,
                t38_enabled: i.t38_enabled,
                t38_udp_ec_preference: i.t38_udp_ec_preference,
            },
            None => LocalCapabilities { audio_codecs: Vec::new(), video_enabled: false, t38_enabled: false, t38_udp_ec_preference: UdpEc::Redundancy },
        };

        let offer = match extract_sdp(&req) {
            Some(body) => match sdp::parse_session(body) {
                Ok(s) => s,
                Err(_) => {
                    drop(dialog);
                    return self.respond_final_invite(&req, &key, &call_id, 488, None, Vec::new(), source).await;
                }
            },
            None => SdpSession::default(),
        };
        let plan = match sdp::negotiate(&offer, &local_caps) {
            Ok(p) => p,
            Err(_) => {
                drop(dialog);
                return self.respond_final_invite(&req, &key, &call_id, 488, None, Vec::new(), source).await;
            }
        };

        let was_on_hold = dialog.invite_usage.media_plan.on_hold;
        if let Err(e) = dialog.apply_reinvite_plan(&offer, plan.clone()) {
            drop(dialog);
            let status = match e {
                DlgError::T38SwitchBackUnsupported => 488,
                _ => 500,
            };
            return self.respond_final_invite(&req, &key, &call_id, status, None, Vec::new(), source).await;
        }
        let t38_now = dialog.is_t38_negotiated();
        drop(dialog);

        let audio_port = self.deps.media_ports.allocate(&call_id).await;
        let video_port = if plan.video_codecs.is_empty() { None } else { Some(self.deps.media_ports.allocate(&call_id).await) };
        let t38_port = if plan.t38.is_some() { Some(self.deps.media_ports.allocate(&call_id).await) } else { None };
        let answer_sdp = sdp::serialize_session(&plan, &self.advertised_host(), audio_port, video_port, t38_port, self.next_origin_id());

        self.respond_final_invite(&req, &key, &call_id, 200, None, answer_sdp.into_bytes(), source).await?;

        if t38_now {
            self.deps.channel.dispatch(&call_id, ChannelEvent::T38Negotiated).await;
        }
        if plan.on_hold != was_on_hold {
            self.deps.channel.dispatch(&call_id, ChannelEvent::Hold { on: plan.on_hold }).await;
        }
        Ok(())
    }

    async fn handle_ack(self: &Arc<Self>, req: Request, _source: SocketAddr) -> Result<()> {
        let call_id = wire::call_id(&req.headers).unwrap_or_default();
        self.cancel_invite_retransmit(&call_id);
        let branch = wire::topmost_branch(&req.headers);
        let key = TransactionKey::server(branch, Method::Invite);
        self.transactions.with_mut(&key, |tx| {
            if let Transaction::InviteServer(t) = tx {
                let _ = t.on_ack();
            }
        });
        self.pending_invites.remove(&call_id);
        Ok(())
    }

    async fn handle_cancel(self: &Arc<Self>, req: Request, source: SocketAddr) -> Result<()> {
        let call_id = wire::call_id(&req.headers).unwrap_or_default();
        let branch = wire::topmost_branch(&req.headers);

        let cancel_ok = wire::build_response(&req, 200, None, Vec::new());
        self.send_message(&Message::Response(cancel_ok), source).await?;

        let Some(original) = self.pending_invites.get(&call_id).map(|e| e.value().clone()) else {
            return Ok(());
        };
        let invite_key = TransactionKey::server(branch, Method::Invite);
        self.transactions.with_mut(&invite_key, |tx| {
            if let Transaction::InviteServer(t) = tx {
                let _ = t.on_response_sent(487);
            }
        });

        let to_tag = match self.dialogs.get(&call_id) {
            Some(handle) => handle.lock().await.id.local_tag.clone(),
            None => wire::new_tag(),
        };
        let terminated = wire::build_response(&original, 487, Some(&to_tag), Vec::new());
        self.last_responses.insert(invite_key, wire::message_bytes(&Message::Response(terminated.clone())));
        self.send_message(&Message::Response(terminated.clone()), source).await?;
        self.schedule_invite_retransmit(call_id.clone(), terminated, source);

        if let Some(handle) = self.dialogs.get(&call_id) {
            handle.lock().await.terminate();
        }
        self.call_slots.remove(&call_id);
        self.deps.channel.dispatch(&call_id, ChannelEvent::HangupWithCause { cause: cause::cause_for_status(487) }).await;
        Ok(())
    }

    async fn handle_bye(self: &Arc<Self>, req: Request, source: SocketAddr) -> Result<()> {
        let call_id = wire::call_id(&req.headers).unwrap_or_default();
        let Some(handle) = self.dialogs.get(&call_id) else {
            let resp = wire::build_response(&req, 481, None, Vec::new());
            self.send_message(&Message::Response(resp), source).await?;
            return Ok(());
        };

        let mut dialog = handle.lock().await;
        let already_terminated = matches!(dialog.state, DialogState::Terminated);
        if let Some(cseq) = wire::cseq_number(&req.headers) {
            if let Err(e) = dialog.observe_remote_cseq(cseq) {
                warn!(%call_id, error = ?e, "out-of-order BYE CSeq");
            }
        }
        dialog.terminate();
        drop(dialog);

        let resp = wire::build_response(&req, 200, None, Vec::new());
        self.send_message(&Message::Response(resp), source).await?;

        if !already_terminated {
            self.cancel_invite_retransmit(&call_id);
            self.call_slots.remove(&call_id);
            self.pending_invites.remove(&call_id);
            if let Some((_, transfer_key)) = self.outbound_transfers.remove(&call_id) {
                info!(%call_id, "referring dialog hung up, cancelling in-flight transfer INVITE");
                self.cancel_client_invite(&transfer_key).await;
            }
            self.deps.channel.dispatch(&call_id, ChannelEvent::HangupWithCause { cause: cause::cause_for_status(200) }).await;
            info!(%call_id, "call terminated by BYE");
        }
        Ok(())
    }

    async fn handle_options(self: &Arc<Self>, req: Request, source: SocketAddr) -> Result<()> {
        let resp = wire::build_response(&req, 200, None, Vec::new());
        let resp = wire::with_header(resp, HeaderName::Allow, dialog::allow_header_value());
        let resp = wire::with_header(resp, HeaderName::Supported, dialog::supported_header_value());
        self.send_message(&Message::Response(resp), source).await
    }

    async fn handle_register_request(self: &Arc<Self>, req: Request, source: SocketAddr) -> Result<()> {
        let call_id = wire::call_id(&req.headers).unwrap_or_default();
        let to_uri = wire::header_uri(req.headers.get(&HeaderName::To).unwrap_or_default());
        let aor = to_uri.and_then(|u| u.user).unwrap_or_default();

        if sipswitch_registrar_core::requires_auth(&self.registrar_config) {
            if let Some(challenge) = self.digest_gate(&req, &self.config.realm, &call_id).await {
                self.send_message(&Message::Response(challenge), source).await?;
                return Ok(());
            }
        }

        let contacts = sipswitch_registrar_core::parse_contacts(req.headers.get_all(&HeaderName::Contact).map(str::to_string));
        let header_expires = req.headers.get(&HeaderName::Expires).and_then(|v| v.trim().parse().ok());
        let cseq = wire::cseq_number(&req.headers).unwrap_or(1);
        let user_agent = req.headers.get(&HeaderName::UserAgent).map(str::to_string);

        let outcome = sipswitch_registrar_core::handle_register(
            &self.location,
            self.deps.binding_store.as_ref(),
            &self.registrar_config,
            &aor,
            &aor,
            &contacts,
            header_expires,
            &call_id,
            cseq,
            user_agent,
            &source.ip().to_string(),
            source.port(),
        )
        .await?;

        let resp = match outcome {
            sipswitch_registrar_core::RegisterOutcome::RemovedAll => wire::build_response(&req, 200, None, Vec::new()),
            sipswitch_registrar_core::RegisterOutcome::RemovedOne { .. } => wire::build_response(&req, 200, None, Vec::new()),
            sipswitch_registrar_core::RegisterOutcome::Queried { bindings } => {
                let mut resp = wire::build_response(&req, 200, None, Vec::new());
                for b in bindings {
                    resp = wire::with_header(resp, HeaderName::Contact, format!("<{}>;expires={}", b.contact_uri, b.expires_at));
                }
                resp
            }
            sipswitch_registrar_core::RegisterOutcome::Registered { bindings, expires } => {
                let mut resp = wire::build_response(&req, 200, None, Vec::new());
                for b in bindings {
                    resp = wire::with_header(resp, HeaderName::Contact, format!("<{}>;expires={}", b.contact_uri, expires));
                }
                wire::with_header(resp, HeaderName::Expires, expires.to_string())
            }
        };
        self.send_message(&Message::Response(resp), source).await
    }

    async fn handle_subscribe(self: &Arc<Self>, req: Request, source: SocketAddr) -> Result<()> {
        let call_id = wire::call_id(&req.headers).unwrap_or_default();
        let expires = req.headers.get(&HeaderName::Expires).and_then(|v| v.trim().parse().ok()).unwrap_or(3600);
        let event = req.headers.get(&HeaderName::Event).unwrap_or("").to_string();
        self.subscriptions.insert(call_id, dialog::SubscribeUsage::new(event, expires));

        let to_tag = wire::new_tag();
        let resp = wire::build_response(&req, 200, Some(&to_tag), Vec::new());
        let resp = wire::with_header(resp, HeaderName::Expires, expires.to_string());
        self.send_message(&Message::Response(resp), source).await
    }

    async fn handle_notify(self: &Arc<Self>, req: Request, source: SocketAddr) -> Result<()> {
        let resp = wire::build_response(&req, 200, None, Vec::new());
        self.send_message(&Message::Response(resp), source).await
    }

    async fn reject_unknown_method(self: &Arc<Self>, req: Request, source: SocketAddr) -> Result<()> {
        let resp = wire::build_response(&req, 501, None, Vec::new());
        let resp = wire::with_header(resp, HeaderName::Allow, dialog::allow_header_value());
        self.send_message(&Message::Response(resp), source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipswitch_sip_core::headers::Headers;
    use sipswitch_sip_core::uri::Uri;

    fn sample_request(content_type: Option<&str>, body: &[u8]) -> Request {
        let mut headers = Headers::new();
        if let Some(ct) = content_type {
            headers.push(HeaderName::ContentType, ct);
        }
        Request { method: Method::Invite, uri: Uri::parse("sip:bob@biloxi.example").unwrap(), headers, body: body.to_vec() }
    }

    #[test]
    fn extracts_sdp_body_when_content_type_matches() {
        let req = sample_request(Some("application/sdp"), b"v=0\r\n");
        assert_eq!(extract_sdp(&req), Some(&b"v=0\r\n"[..]));
    }

    #[test]
    fn no_sdp_body_without_matching_content_type() {
        let req = sample_request(Some("text/plain"), b"hello");
        assert_eq!(extract_sdp(&req), None);
    }

    #[test]
    fn unsupported_tags_reports_non_replaces_requires() {
        let mut headers = Headers::new();
        headers.push(HeaderName::Require, "100rel, replaces");
        let req = Request { method: Method::Invite, uri: Uri::parse("sip:bob@biloxi.example").unwrap(), headers, body: Vec::new() };
        assert_eq!(unsupported_tags(&req), vec!["100rel".to_string()]);
    }

    #[test]
    fn no_require_header_means_no_unsupported_tags() {
        let req = sample_request(None, b"");
        assert!(unsupported_tags(&req).is_empty());
    }
}

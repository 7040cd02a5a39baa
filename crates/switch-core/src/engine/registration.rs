//! Outbound registration (spec §4.7): sends one REGISTER per configured
//! `register =` entry, retries once with digest credentials on
//! `401`/`407`, and reschedules itself per [`refresh_delay`] after a
//! successful `200 OK`, grounded in [`super::keepalive`]'s poke loop.

use std::sync::Arc;

use tracing::{info, warn};

use sipswitch_dialog_core::transaction::{timer::TIMER_F, TransactionKey};
use sipswitch_registrar_core::uac::{process_response, refresh_delay, UacOutcome};
use sipswitch_sip_core::headers::{split_scheme, AuthParams, HeaderName};
use sipswitch_sip_core::prelude::{Method, Uri};

use super::{ClientKind, Engine};

impl Engine {
    /// Kick off one registration attempt for every configured entry
    /// (called once from `run_monitor` at startup).
    pub(crate) async fn start_registrations(self: &Arc<Self>) {
        let entries: Vec<usize> = {
            let guard = self.registrations.lock().await;
            (0..guard.len()).collect()
        };
        for index in entries {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.register_once(index, None).await;
            });
        }
    }

    /// Send a single REGISTER for `self.registrations[index]`, optionally
    /// with a precomputed `Authorization` header (the 401/407 retry leg),
    /// and act on the result: reschedule a refresh, retry with auth, or
    /// give up for this entry.
    async fn register_once(self: &Arc<Self>, index: usize, authorization: Option<String>) {
        let (aor, host, port, refresh_seconds) = {
            let guard = self.registrations.lock().await;
            let Some(entry) = guard.get(index) else { return };
            (entry.aor.clone(), entry.host.clone(), entry.port, entry.refresh_seconds)
        };

        let Some(dest) = self.resolve_registrar_destination(&host, port).await else {
            warn!(aor = %aor, "could not resolve registrar destination");
            return;
        };

        let call_id = format!("reg-{}-{}", aor, self.next_origin_id());
        let local_tag = crate::wire::new_tag();
        let from = format!("<sip:{}@{}>;tag={}", aor, self.advertised_host(), local_tag);
        let to = format!("<sip:{}@{}>", aor, host);
        let target = Uri::new(host.clone()).with_user(aor.clone());
        let mut req = crate::wire::build_request(Method::Register, target, &call_id, &from, &to, 1, &self.advertised_host(), self.local_port());
        req.headers.push(
            HeaderName::Contact,
            format!("<sip:{}@{}:{}>", aor, self.advertised_host(), self.local_port()),
        );
        req.headers.push(HeaderName::Expires, refresh_seconds.to_string());
        if let Some(auth) = &authorization {
            req.headers.push(HeaderName::Authorization, auth.clone());
        }

        let branch = crate::wire::topmost_branch(&req.headers);
        let key = TransactionKey::client(branch, Method::Register, call_id.clone(), 1);

        let outcome = self
            .drive_client_transaction(key, call_id.clone(), req, dest, ClientKind::NonInvite, TIMER_F)
            .await
            .and_then(|outcome| match outcome {
                super::ResponseOutcome::Final { status, expires } => Some((status, expires)),
                super::ResponseOutcome::Timeout => None,
            });
        if outcome.is_none() {
            warn!(aor = %aor, "REGISTER got no final response");
        }

        let uac_outcome = {
            let mut guard = self.registrations.lock().await;
            let Some(entry) = guard.get_mut(index) else { return };
            match outcome {
                Some((status, expires)) => process_response(entry, status, expires),
                None => {
                    entry.state = sipswitch_registrar_core::uac::RegistrationState::Timeout;
                    UacOutcome::Timeout
                }
            }
        };

        match uac_outcome {
            UacOutcome::Registered { expires } => {
                info!(aor = %aor, expires, "registered");
                self.pending_challenges.remove(&call_id);
                let engine = self.clone();
                self.scheduler.add(refresh_delay(expires), move || {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        engine.register_once(index, None).await;
                    });
                });
            }
            UacOutcome::RetryWithAuth => {
                let challenge_value = self.pending_challenges.remove(&call_id).map(|(_, v)| v);
                let Some(raw) = challenge_value else {
                    warn!(aor = %aor, "401/407 with no challenge header, giving up");
                    return;
                };
                let (user, secret) = {
                    let guard = self.registrations.lock().await;
                    let entry = &guard[index];
                    (entry.user.clone(), entry.secret.clone())
                };
                let auth_header = self.build_register_authorization(&raw, &user, &secret, &aor, &host);
                self.register_once(index, auth_header).await;
            }
            UacOutcome::AuthExhausted | UacOutcome::Rejected => {
                warn!(aor = %aor, "registration rejected");
            }
            UacOutcome::Timeout => {
                warn!(aor = %aor, "registration timed out, retrying after refresh window");
                let engine = self.clone();
                self.scheduler.add(refresh_delay(refresh_seconds), move || {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        engine.register_once(index, None).await;
                    });
                });
            }
        }
    }

    /// Compute an `Authorization` header answering `raw` (the stored
    /// `WWW-Authenticate`/`Proxy-Authenticate` value) for a REGISTER to
    /// `sip:{user}@{host}` (spec §4.7/§4.6).
    fn build_register_authorization(&self, raw: &str, user: &str, secret: &str, aor: &str, host: &str) -> Option<String> {
        let (_scheme, rest) = split_scheme(raw);
        let params = AuthParams::parse(rest);
        let realm = params.get("realm")?.to_string();
        let nonce = params.get("nonce")?.to_string();
        let uri = format!("sip:{aor}@{host}");

        let ha1 = sipswitch_auth_core::digest::ha1(user, &realm, secret);
        let ha2 = sipswitch_auth_core::digest::ha2("REGISTER", &uri);
        let response = sipswitch_auth_core::digest::response_no_qop(&ha1, &nonce, &ha2);

        let mut out = format!(
            r#"Digest username="{user}", realm="{realm}", nonce="{nonce}", uri="{uri}", response="{response}", algorithm=MD5"#
        );
        if let Some(opaque) = params.get("opaque") {
            out.push_str(&format!(r#", opaque="{opaque}""#));
        }
        Some(out)
    }

    async fn resolve_registrar_destination(&self, host: &str, port: u16) -> Option<std::net::SocketAddr> {
        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            return Some(std::net::SocketAddr::new(ip, port));
        }
        let targets = self.deps.resolver.resolve(host).await;
        targets.into_iter().max_by_key(|t| t.weight).map(|t| std::net::SocketAddr::new(t.addr, if port != 0 { port } else { t.port }))
    }
}

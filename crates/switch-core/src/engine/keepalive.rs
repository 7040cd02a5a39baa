//! OPTIONS keepalive/poke (spec §4.5): one outstanding OPTIONS per
//! configured peer with `qualify`, driven by the interval
//! [`Engine::schedule_pokes`] arms in `engine/mod.rs`.

use std::sync::Arc;

use tracing::{debug, warn};

use sipswitch_dialog_core::dialog::{record_poke_result, PeerReachability};
use sipswitch_dialog_core::transaction::TransactionKey;
use sipswitch_sip_core::prelude::{Method, Uri};

use crate::channel::ChannelEvent;

use super::{ClientKind, Engine, ResponseOutcome};

impl Engine {
    /// Resolve `peer_name`'s current contact (spec §9's keepalive-target
    /// decision: the registrar's location table doubles as the poke
    /// destination, since `PeerConfig` carries no address of its own), send
    /// one OPTIONS, and record the outcome.
    pub(crate) async fn send_poke(self: &Arc<Self>, peer_name: &str) {
        let Some(binding) = self.location.bindings_for(peer_name).into_iter().next() else {
            debug!(peer = peer_name, "no binding to poke yet");
            return;
        };
        let Ok(target) = Uri::parse(&binding.contact_uri) else {
            warn!(peer = peer_name, contact = %binding.contact_uri, "unparsable contact, skipping poke");
            return;
        };
        let Some(dest) = self.resolve_poke_destination(&target).await else {
            warn!(peer = peer_name, "could not resolve poke destination");
            self.record_poke_outcome(peer_name, false).await;
            return;
        };

        let call_id = format!("poke-{}-{}", peer_name, self.next_origin_id());
        let local_tag = crate::wire::new_tag();
        let from = format!("<sip:{}@{}>;tag={}", peer_name, self.advertised_host(), local_tag);
        let to = format!("<{target}>");
        let req = crate::wire::build_request(Method::Options, target.clone(), &call_id, &from, &to, 1, &self.advertised_host(), self.local_port());

        let branch = crate::wire::topmost_branch(&req.headers);
        let key = TransactionKey::client(branch, Method::Options, call_id.clone(), 1);
        let qualify_timeout = self.qualify_timeout(peer_name);

        let outcome = self.drive_client_transaction(key, call_id, req, dest, ClientKind::NonInvite, qualify_timeout).await;
        let ok = matches!(outcome, Some(ResponseOutcome::Final { .. }));
        self.record_poke_outcome(peer_name, ok).await;
    }

    async fn record_poke_outcome(&self, peer_name: &str, ok: bool) {
        let mut became_unreachable = false;
        let mut became_reachable = false;
        if let Some(mut entry) = self.pokes.get_mut(peer_name) {
            let was_reachable = entry.reachability == PeerReachability::Reachable;
            record_poke_result(&mut entry.reachability, &mut entry.failures, ok);
            became_unreachable = was_reachable && entry.reachability == PeerReachability::Unreachable;
            became_reachable = !was_reachable && entry.reachability == PeerReachability::Reachable;
        }
        if became_reachable {
            self.deps.channel.dispatch(peer_name, ChannelEvent::PeerStatus { peer: peer_name.to_string(), reachable: true }).await;
        }
        if became_unreachable {
            self.deps.channel.dispatch(peer_name, ChannelEvent::PeerStatus { peer: peer_name.to_string(), reachable: false }).await;
        }
    }

    /// Resolve the poke's `host:port` via the configured resolver, falling
    /// back to the contact URI's literal host/port when it's already a
    /// dotted IP.
    async fn resolve_poke_destination(&self, target: &Uri) -> Option<std::net::SocketAddr> {
        let port = target.port.unwrap_or(5060);
        if let Ok(ip) = target.host.parse::<std::net::IpAddr>() {
            return Some(std::net::SocketAddr::new(ip, port));
        }
        let targets = self.deps.resolver.resolve(&target.host).await;
        targets.into_iter().max_by_key(|t| t.weight).map(|t| std::net::SocketAddr::new(t.addr, t.port))
    }
}

//! The engine facade (spec §1/§5): wires the codec, SDP negotiator,
//! transport, transaction layer, dialog layer, digest auth, and registrar
//! crates into a running SIP user agent. Exactly two long-running tasks
//! are spawned per [`Engine::spawn`] (spec §5): a network-reader task that
//! drains [`TransportEvent`]s and a monitor task that drives the
//! scheduler plus registration refresh, keepalive pokes, and the
//! registrar/dialog expiry sweeps.

mod client_transaction;
mod keepalive;
mod registration;
mod requests;
mod responses;
mod transfer;

pub(crate) use client_transaction::ClientKind;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use sipswitch_auth_core::AuthVerifier;
use sipswitch_dialog_core::dialog::SubscribeUsage;
use sipswitch_dialog_core::transaction::{TransactionKey, TransactionManager};
use sipswitch_infra_common::scheduler::{Outcome, Scheduler, TimerId};
use sipswitch_registrar_core::{LocationService, RegistrarConfig, RegistrationEntry};
use sipswitch_sip_core::message::{Message, Request};
use sipswitch_sip_transport::{Transport, TransportEvent, UdpTransport};

use crate::account::{Account, Binding as OutboundBinding};
use crate::call_limit::{CallLimiter, CallSlot};
use crate::channel::ChannelSink;
use crate::config::Config;
use crate::dialog_table::DialogTable;
use crate::error::{EngineError, Result};
use crate::media_port::MediaPortAllocator;
use crate::resolver::Resolver;

/// Host collaborators the engine cannot supply itself (spec §1's "host
/// collaborators" line, spec §9's "define traits ... and implement them
/// separately"). Every field is a seam implemented by whatever owns the
/// dial plan, account database, and media sockets.
pub struct EngineDeps {
    pub accounts: Arc<dyn Account>,
    pub outbound: Arc<dyn OutboundBinding>,
    pub resolver: Arc<dyn Resolver>,
    pub channel: Arc<dyn ChannelSink>,
    pub credentials: Arc<dyn sipswitch_auth_core::CredentialStore>,
    pub binding_store: Arc<dyn sipswitch_registrar_core::BindingStore>,
    pub media_ports: Arc<dyn MediaPortAllocator>,
}

/// Per-configured-peer OPTIONS "poke" bookkeeping (spec §4.5 keepalive).
struct PokeState {
    reachability: sipswitch_dialog_core::dialog::PeerReachability,
    failures: u8,
    /// The peer's configured `qualify=<millis>` response-time threshold --
    /// how long a poke waits for a response before the peer is declared
    /// `Unreachable`, independent of the transaction layer's own Timer F.
    qualify_millis: u32,
}

/// The running engine. Cheap to clone by `Arc` -- every method that needs
/// shared state takes `self: &Arc<Self>` so callbacks (scheduler timers,
/// spawned tasks) can hold their own handle.
pub struct Engine {
    pub config: Config,
    pub scheduler: Arc<Scheduler>,
    pub transport: Arc<UdpTransport>,
    pub dialogs: Arc<DialogTable>,
    pub transactions: Arc<TransactionManager>,
    pub auth: Arc<AuthVerifier>,
    pub location: Arc<LocationService>,
    pub registrar_config: RegistrarConfig,
    pub deps: EngineDeps,
    pub call_limiter: Arc<CallLimiter>,

    pub(crate) call_slots: DashMap<String, CallSlot>,
    pub(crate) subscriptions: DashMap<String, SubscribeUsage>,
    pub(crate) invite_retransmit_timers: DashMap<String, TimerId>,
    pub(crate) invite_branch: DashMap<String, String>,
    pub(crate) registrations: Mutex<Vec<RegistrationEntry>>,
    pokes: DashMap<String, PokeState>,
    /// Outstanding OPTIONS pokes and REGISTER refreshes waiting on their
    /// final response, keyed by Call-ID (spec §4.5/§4.7 -- the transaction
    /// layer itself stays a pure state machine with no notion of "who is
    /// awaiting this transaction").
    pub(crate) response_waiters: DashMap<String, tokio::sync::oneshot::Sender<ResponseOutcome>>,
    /// Raw bytes of the last response sent for a given server transaction,
    /// kept so a retransmitted request (spec §4.4: "absorbed by resending
    /// the last final response") can be answered without re-running
    /// request processing.
    pub(crate) last_responses: DashMap<TransactionKey, Vec<u8>>,
    /// Last challenge (`WWW-Authenticate`/`Proxy-Authenticate` raw value)
    /// seen on a 401/407, keyed by Call-ID, so the UAC refresh loop in
    /// `registration.rs` can compute a digest response without the
    /// transaction layer needing to know about authentication at all.
    pub(crate) pending_challenges: DashMap<String, String>,
    /// The most recent non-ACK INVITE request seen for a given Call-ID
    /// (spec §4.4 CANCEL handling and §4.5 re-INVITE: both need to
    /// rebuild a response to the *original* INVITE, which the codec
    /// layer never retains on its own per spec §3's "Ownership" note).
    pub(crate) pending_invites: DashMap<String, Request>,
    /// Original request + destination for every outbound client
    /// transaction currently in flight (spec §4.4), keyed the same way the
    /// transaction itself is. Lets a response handler rebuild a `CANCEL`
    /// or a transaction-level `ACK` without threading those bytes through
    /// every call site that originates a request.
    pub(crate) outbound_transactions: DashMap<TransactionKey, (Request, SocketAddr)>,
    /// Referring call-ID -> the client `TransactionKey` of its in-flight
    /// blind-transfer INVITE (spec §4.5), so a `BYE` that tears down the
    /// referring dialog while the new leg is still ringing can `CANCEL`
    /// it instead of leaving it stalled.
    pub(crate) outbound_transfers: DashMap<String, TransactionKey>,
    origin_id: AtomicU64,
    mapped_addr: std::sync::Mutex<Option<SocketAddr>>,
}

/// What a pending outbound non-INVITE transaction resolved to (spec §4.5
/// keepalive and §4.7 registration both need "did we get *any* final
/// response, and if so with what status/expires").
#[derive(Debug, Clone)]
pub(crate) enum ResponseOutcome {
    Final { status: u16, expires: Option<u32> },
    Timeout,
}

impl Engine {
    /// Bind the UDP socket, seed the registrar from persisted bindings,
    /// and build the registration list from `config.registrations` (spec
    /// §4.6/§4.7). Returns the engine plus the raw transport event
    /// receiver -- pass both to [`Engine::spawn`].
    pub async fn bind(config: Config, deps: EngineDeps) -> Result<(Arc<Engine>, mpsc::Receiver<TransportEvent>)> {
        let bind_addr = SocketAddr::new(config.bind_addr, config.bind_port);
        let (transport, rx) = UdpTransport::bind(bind_addr).await?;

        let location = Arc::new(LocationService::new());
        location.seed_from_store(deps.binding_store.as_ref()).await;

        let registrar_config = RegistrarConfig {
            max_expiry: config.max_expiry,
            default_expiry: config.default_expiry,
            max_contacts: 1,
            allow_guest: config.allow_guest,
            always_auth_reject: config.always_auth_reject,
        };

        let auth = Arc::new(AuthVerifier::new(deps.credentials.clone(), true));

        let registrations = config
            .registrations
            .iter()
            .map(|r| {
                RegistrationEntry::new(
                    r.user.clone(),
                    r.host.clone(),
                    r.port,
                    r.auth_user.clone().unwrap_or_else(|| r.user.clone()),
                    r.secret.clone().unwrap_or_default(),
                    config.extern_refresh_secs.max(config.default_expiry),
                )
            })
            .collect();

        let engine = Arc::new(Engine {
            config,
            scheduler: Arc::new(Scheduler::new()),
            transport: Arc::new(transport),
            dialogs: Arc::new(DialogTable::new()),
            transactions: Arc::new(TransactionManager::new()),
            auth,
            location,
            registrar_config,
            deps,
            call_limiter: Arc::new(CallLimiter::new()),
            call_slots: DashMap::new(),
            subscriptions: DashMap::new(),
            invite_retransmit_timers: DashMap::new(),
            invite_branch: DashMap::new(),
            registrations: Mutex::new(registrations),
            pokes: DashMap::new(),
            response_waiters: DashMap::new(),
            last_responses: DashMap::new(),
            pending_challenges: DashMap::new(),
            pending_invites: DashMap::new(),
            outbound_transactions: DashMap::new(),
            outbound_transfers: DashMap::new(),
            origin_id: AtomicU64::new(1),
            mapped_addr: std::sync::Mutex::new(None),
        });

        Ok((engine, rx))
    }

    /// Spawn the two long-running tasks spec §5 names: the network
    /// reader (drains `events`, dispatches each message) and the monitor
    /// (drives the scheduler and owns everything time-based). Returns
    /// their join handles so a host can await or abort them.
    pub fn spawn(self: &Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let reader_engine = self.clone();
        let reader = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Message { message, source } => {
                        reader_engine.clone().dispatch(message, source).await;
                    }
                    TransportEvent::Malformed { source, reason } => {
                        warn!(%source, reason, "dropped malformed datagram");
                    }
                }
            }
        });

        let monitor_engine = self.clone();
        let monitor = tokio::spawn(async move {
            monitor_engine.run_monitor().await;
        });

        (reader, monitor)
    }

    async fn run_monitor(self: Arc<Self>) {
        self.start_registrations().await;
        self.schedule_pokes();
        self.schedule_sweeps();

        loop {
            let wait_ms = self.scheduler.wait(std::time::Instant::now());
            let delay = Duration::from_millis(wait_ms.unwrap_or(1000).min(1000));
            tokio::time::sleep(delay).await;
            self.scheduler.drive(std::time::Instant::now());
        }
    }

    async fn dispatch(self: Arc<Self>, message: Message, source: SocketAddr) {
        let result = match message {
            Message::Request(req) => self.handle_request(req, source).await,
            Message::Response(resp) => self.handle_response(resp, source).await,
        };
        if let Err(err) = result {
            error!(%source, error = %err, "error handling message");
        }
    }

    pub(crate) fn next_origin_id(&self) -> u64 {
        self.origin_id.fetch_add(1, Ordering::Relaxed)
    }

    /// The host/address this engine puts in `Via`/`Contact`/SDP `c=`
    /// lines (spec §4.9: external-IP override when behind static NAT).
    pub(crate) fn advertised_host(&self) -> String {
        if let Some(host) = &self.config.extern_host {
            return host.clone();
        }
        if let Some(ip) = self.config.extern_ip {
            return ip.to_string();
        }
        if let Some(mapped) = *self.mapped_addr.lock().unwrap() {
            return mapped.ip().to_string();
        }
        self.config.bind_addr.to_string()
    }

    pub(crate) fn local_port(&self) -> u16 {
        self.config.bind_port
    }

    pub(crate) async fn send_message(&self, message: &Message, dest: SocketAddr) -> Result<()> {
        let bytes = crate::wire::message_bytes(message);
        self.transport.send_to(&bytes, dest).await?;
        Ok(())
    }

    /// Schedule the dialog-owned 2xx retransmission timer (spec §9: the
    /// transaction layer explicitly leaves retransmitting a 2xx to the
    /// dialog; `InviteServerTransaction::on_response_sent` returns
    /// `ServerAction::None` for the 2xx case).
    pub(crate) fn schedule_invite_retransmit(self: &Arc<Self>, call_id: String, response: sipswitch_sip_core::message::Response, dest: SocketAddr) {
        let engine = self.clone();
        let key = call_id.clone();
        let mut delay = sipswitch_dialog_core::transaction::timer::T1;
        let max_delay = sipswitch_dialog_core::transaction::timer::TIMER_D_LIKE;
        let id = self.scheduler.add(delay, move || {
            let engine = engine.clone();
            let response = response.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let msg = Message::Response(response);
                if let Err(e) = engine.send_message(&msg, dest).await {
                    warn!(call_id = %key, error = %e, "failed to retransmit 2xx");
                }
            });
            delay = (delay * 2).min(max_delay);
            if delay >= max_delay {
                Outcome::Done
            } else {
                Outcome::Reschedule(delay)
            }
        });
        self.invite_retransmit_timers.insert(call_id, id);
    }

    pub(crate) fn cancel_invite_retransmit(&self, call_id: &str) {
        if let Some((_, id)) = self.invite_retransmit_timers.remove(call_id) {
            self.scheduler.del(id);
        }
    }

    fn schedule_pokes(self: &Arc<Self>) {
        for peer in self.config.peers.clone() {
            let crate::config::Qualify::Millis(qualify_millis) = peer.qualify else { continue };
            self.pokes.insert(
                peer.name.clone(),
                PokeState { reachability: sipswitch_dialog_core::dialog::PeerReachability::Reachable, failures: 0, qualify_millis },
            );
            let engine = self.clone();
            let name = peer.name.clone();
            self.scheduler.add(sipswitch_dialog_core::dialog::poke_interval(sipswitch_dialog_core::dialog::PeerReachability::Reachable), move || {
                let engine = engine.clone();
                let name = name.clone();
                tokio::spawn(async move {
                    engine.send_poke(&name).await;
                });
                Outcome::Reschedule(engine.next_poke_interval(&name))
            });
        }
    }

    /// The configured `qualify=<millis>` threshold for `peer`'s poke
    /// (spec §8 S5: "a response within `qualify` ms keeps Reachable, else
    /// ... Unreachable" -- distinct from the transaction layer's own
    /// Timer F, which bounds retransmission, not reachability).
    pub(crate) fn qualify_timeout(&self, peer: &str) -> Duration {
        self.pokes.get(peer).map(|p| Duration::from_millis(p.qualify_millis as u64)).unwrap_or(sipswitch_dialog_core::transaction::timer::TIMER_F)
    }

    fn next_poke_interval(&self, peer: &str) -> Duration {
        let reachability = self
            .pokes
            .get(peer)
            .map(|p| p.reachability)
            .unwrap_or(sipswitch_dialog_core::dialog::PeerReachability::Reachable);
        sipswitch_dialog_core::dialog::poke_interval(reachability)
    }

    fn schedule_sweeps(self: &Arc<Self>) {
        let engine = self.clone();
        self.scheduler.add_periodic(Duration::from_secs(5), move || {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.sweep_registrar().await;
                engine.sweep_dialogs().await;
            });
        });
    }

    async fn sweep_registrar(&self) {
        let now = sipswitch_registrar_core::binding::now_epoch();
        for (aor, _binding) in self.location.sweep_expired(now) {
            info!(aor = %aor, "registrar binding expired");
            self.deps.channel.dispatch(&aor, crate::channel::ChannelEvent::Unregistered { aor: aor.clone() }).await;
        }
    }

    async fn sweep_dialogs(&self) {
        let now = std::time::SystemTime::now();
        for call_id in self.dialogs.snapshot_keys() {
            let Some(handle) = self.dialogs.get(&call_id) else { continue };
            let dialog = handle.lock().await;
            if dialog.ready_for_autodestruct(now, sipswitch_dialog_core::transaction::timer::DIALOG_AUTODESTRUCT) {
                drop(dialog);
                self.dialogs.remove(&call_id);
                self.cancel_invite_retransmit(&call_id);
                info!(call_id = %call_id, "dialog autodestructed");
            }
        }
    }
}

//! Single UDP socket transport (spec §4.3): one socket for both SIP and
//! STUN, payload classified on receive, and a STUN in-flight table the NAT
//! layer consults when rewriting outgoing messages (spec §4.9).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

use sipswitch_sip_core::message::Message;
use sipswitch_sip_core::parser::{parse_message, ParserMode};

use crate::error::{Error, Result};
use crate::stun::{self, BindingResponse, TransactionId};

/// Delivered by the receive loop: a parsed SIP message from its source
/// address, or notice that an unparseable datagram was dropped.
#[derive(Debug)]
pub enum TransportEvent {
    Message { message: Message, source: SocketAddr },
    Malformed { source: SocketAddr, reason: String },
}

/// Maximum time to wait for a STUN Binding Response before falling back to
/// the configured external IP (spec §4.3/§4.9: "Max 4 seconds of retries").
pub const STUN_TIMEOUT: Duration = Duration::from_secs(4);

struct StunTable {
    pending: Mutex<HashMap<TransactionId, oneshot::Sender<BindingResponse>>>,
}

impl StunTable {
    fn new() -> Self {
        StunTable { pending: Mutex::new(HashMap::new()) }
    }

    async fn register(&self, txid: TransactionId) -> oneshot::Receiver<BindingResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(txid, tx);
        rx
    }

    async fn resolve(&self, resp: BindingResponse) {
        if let Some(tx) = self.pending.lock().await.remove(&resp.txid) {
            let _ = tx.send(resp);
        }
    }
}

/// The send/recv seam spec.md's Non-goals explicitly keep TCP/TLS out of
/// (spec §4.3) -- UDP is the only implementation required, but callers
/// (the transaction layer) go through this trait rather than a concrete
/// `UdpTransport` so that boundary stays explicit.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<()>;
    fn local_addr(&self) -> Result<SocketAddr>;
}

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    stun: Arc<StunTable>,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let (tx, rx) = mpsc::channel(256);
        let stun = Arc::new(StunTable::new());

        let recv_socket = socket.clone();
        let recv_stun = stun.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; sipswitch_sip_core::parser::MAX_DATAGRAM];
            loop {
                match recv_socket.recv_from(&mut buf).await {
                    Ok((n, source)) => {
                        let datagram = &buf[..n];
                        if stun::looks_like_stun(datagram) {
                            match stun::decode_binding_response(datagram) {
                                Ok(Some(resp)) => recv_stun.resolve(resp).await,
                                Ok(None) => debug!(%source, "non-binding-response STUN message dropped"),
                                Err(e) => warn!(%source, error = %e, "malformed STUN header"),
                            }
                            continue;
                        }
                        match parse_message(datagram, ParserMode::Lenient) {
                            Ok(message) => {
                                if tx.send(TransportEvent::Message { message, source }).await.is_err() {
                                    break;
                                }
                            }
                            Err(reject) => {
                                let _ = tx
                                    .send(TransportEvent::Malformed { source, reason: reject.to_string() })
                                    .await;
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "UDP recv error");
                        break;
                    }
                }
            }
        });

        Ok((UdpTransport { socket, stun }, rx))
    }

    /// Issue a STUN Binding Request on the same socket and wait up to
    /// [`STUN_TIMEOUT`] for the mapped address (spec §4.9).
    pub async fn discover_mapping(&self, stun_server: SocketAddr) -> Result<SocketAddr> {
        let txid = stun::new_transaction_id();
        let rx = self.stun.register(txid).await;
        let req = stun::encode_binding_request(&txid);
        self.socket.send_to(&req, stun_server).await?;

        match tokio::time::timeout(STUN_TIMEOUT, rx).await {
            Ok(Ok(resp)) => Ok(resp.mapped_address),
            _ => Err(Error::StunTimeout(STUN_TIMEOUT)),
        }
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<()> {
        self.socket.send_to(bytes, dest).await?;
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

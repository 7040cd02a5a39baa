//! Per-AoR binding sets (spec §3 "Binding (registrar side)") and the
//! host-provided persistence seam (spec §6 "Persisted state"), grounded in
//! the teacher's `registrar-core::registrar::location` `LocationService`
//! pattern (a `dashmap`-backed table re-seeded from a store at startup).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{Error, Result};

/// One `(contact-URI, expires-at, user-agent, call-id, cseq)` entry (spec
/// §3). `expires_at` is a Unix epoch second so it round-trips through the
/// on-disk `<addr>:<port>:<expiry-epoch>:<username>:<contact-uri>` format
/// (spec §6) without timezone ambiguity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub contact_uri: String,
    pub expires_at: u64,
    pub user_agent: Option<String>,
    pub call_id: String,
    pub cseq: u32,
}

impl Binding {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

pub fn now_epoch() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Bindings for one address-of-record. Enforces the `max_contacts`
/// invariant (spec §8 Testable Property 5; default 1 unless
/// `allow_multi_contact`).
#[derive(Debug, Clone, Default)]
pub struct AorBindings {
    pub bindings: Vec<Binding>,
}

impl AorBindings {
    /// Apply one registered contact, respecting Call-ID/CSeq ordering
    /// (spec §3 invariant: "mismatched Call-ID with lower CSeq is
    /// rejected") and the contact cap.
    pub fn upsert(&mut self, binding: Binding, max_contacts: usize) -> Result<()> {
        if let Some(existing) = self.bindings.iter_mut().find(|b| b.contact_uri == binding.contact_uri) {
            if existing.call_id == binding.call_id && binding.cseq <= existing.cseq {
                return Err(Error::CSeqConflict);
            }
            *existing = binding;
            return Ok(());
        }
        if self.bindings.len() >= max_contacts {
            return Err(Error::TooManyContacts(max_contacts));
        }
        self.bindings.push(binding);
        Ok(())
    }

    pub fn remove(&mut self, contact_uri: &str) {
        self.bindings.retain(|b| b.contact_uri != contact_uri);
    }

    pub fn remove_all(&mut self) {
        self.bindings.clear();
    }

    pub fn sweep_expired(&mut self, now: u64) -> Vec<Binding> {
        let (keep, expired): (Vec<_>, Vec<_>) = self.bindings.drain(..).partition(|b| !b.is_expired(now));
        self.bindings = keep;
        expired
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// One persisted row (spec §6): `<addr>:<port>:<expiry-epoch>:<username>:<contact-uri>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedBinding {
    pub addr: String,
    pub port: u16,
    pub expiry_epoch: u64,
    pub username: String,
    pub contact_uri: String,
}

impl PersistedBinding {
    pub fn to_row(&self) -> String {
        format!("{}:{}:{}:{}:{}", self.addr, self.port, self.expiry_epoch, self.username, self.contact_uri)
    }

    pub fn parse_row(row: &str) -> Option<PersistedBinding> {
        let mut parts = row.splitn(5, ':');
        let addr = parts.next()?.to_string();
        let port: u16 = parts.next()?.parse().ok()?;
        let expiry_epoch: u64 = parts.next()?.parse().ok()?;
        let username = parts.next()?.to_string();
        let contact_uri = parts.next()?.to_string();
        Some(PersistedBinding { addr, port, expiry_epoch, username, contact_uri })
    }
}

/// Host-provided binding persistence (spec §6). The engine re-loads this
/// at startup to re-seed the table "before first contact" and writes
/// through it on every successful REGISTER.
#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn load_all(&self) -> Vec<PersistedBinding>;
    async fn save(&self, username: &str, binding: &PersistedBinding);
    async fn remove(&self, username: &str, contact_uri: &str);
}

/// Reference in-memory implementation, and the table the registrar
/// actually negotiates against at runtime.
#[derive(Default)]
pub struct LocationService {
    aors: DashMap<String, AorBindings>,
}

impl LocationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-seed from a host store at startup (spec §6).
    pub async fn seed_from_store(&self, store: &dyn BindingStore) {
        for row in store.load_all().await {
            let mut aor = self.aors.entry(row.username.clone()).or_default();
            aor.bindings.push(Binding {
                contact_uri: row.contact_uri,
                expires_at: row.expiry_epoch,
                user_agent: None,
                call_id: String::new(),
                cseq: 0,
            });
        }
    }

    pub fn bindings_for(&self, aor: &str) -> Vec<Binding> {
        self.aors.get(aor).map(|e| e.bindings.clone()).unwrap_or_default()
    }

    pub fn upsert(&self, aor: &str, binding: Binding, max_contacts: usize) -> Result<()> {
        self.aors.entry(aor.to_string()).or_default().upsert(binding, max_contacts)
    }

    pub fn remove_all(&self, aor: &str) {
        if let Some(mut entry) = self.aors.get_mut(aor) {
            entry.remove_all();
        }
    }

    pub fn remove(&self, aor: &str, contact_uri: &str) {
        if let Some(mut entry) = self.aors.get_mut(aor) {
            entry.remove(contact_uri);
        }
    }

    /// Sweep every AoR for expired bindings, returning `(aor, binding)`
    /// pairs so the caller can emit `PeerStatus Unregistered` events
    /// (spec §8 scenario S5).
    pub fn sweep_expired(&self, now: u64) -> Vec<(String, Binding)> {
        let mut expired = Vec::new();
        for mut entry in self.aors.iter_mut() {
            let aor = entry.key().clone();
            for binding in entry.value_mut().sweep_expired(now) {
                expired.push((aor.clone(), binding));
            }
        }
        expired
    }
}

/// In-memory [`BindingStore`] for tests and hosts with no richer store.
#[derive(Default)]
pub struct InMemoryBindingStore {
    rows: DashMap<(String, String), PersistedBinding>,
}

impl InMemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BindingStore for InMemoryBindingStore {
    async fn load_all(&self) -> Vec<PersistedBinding> {
        self.rows.iter().map(|e| e.value().clone()).collect()
    }

    async fn save(&self, username: &str, binding: &PersistedBinding) {
        self.rows.insert((username.to_string(), binding.contact_uri.clone()), binding.clone());
    }

    async fn remove(&self, username: &str, contact_uri: &str) {
        self.rows.remove(&(username.to_string(), contact_uri.to_string()));
    }
}

/// Clamp a requested expiry into `[1, max_expiry]` (spec §4.7/§8 Testable
/// Property 6).
pub fn clamp_expiry(requested: u32, max_expiry: u32) -> u32 {
    requested.clamp(1, max_expiry)
}

pub fn expiry_epoch_from_now(seconds: u32) -> u64 {
    now_epoch() + Duration::from_secs(seconds as u64).as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_contacts_is_one() {
        let mut aor = AorBindings::default();
        let b1 = Binding { contact_uri: "sip:a@1.1.1.1".into(), expires_at: 1000, user_agent: None, call_id: "c1".into(), cseq: 1 };
        let b2 = Binding { contact_uri: "sip:a@2.2.2.2".into(), expires_at: 1000, user_agent: None, call_id: "c2".into(), cseq: 1 };
        aor.upsert(b1, 1).unwrap();
        assert_eq!(aor.upsert(b2, 1), Err(Error::TooManyContacts(1)));
    }

    #[test]
    fn lower_cseq_with_same_call_id_is_rejected() {
        let mut aor = AorBindings::default();
        let b1 = Binding { contact_uri: "sip:a@1.1.1.1".into(), expires_at: 1000, user_agent: None, call_id: "c1".into(), cseq: 5 };
        aor.upsert(b1.clone(), 1).unwrap();
        let stale = Binding { cseq: 3, ..b1 };
        assert_eq!(aor.upsert(stale, 1), Err(Error::CSeqConflict));
    }

    #[test]
    fn persisted_row_round_trips() {
        let row = PersistedBinding {
            addr: "203.0.113.9".into(),
            port: 5060,
            expiry_epoch: 1_700_000_000,
            username: "bob".into(),
            contact_uri: "sip:bob@203.0.113.9:5060".into(),
        };
        let text = row.to_row();
        assert_eq!(PersistedBinding::parse_row(&text), Some(row));
    }

    #[test]
    fn clamp_respects_bounds() {
        assert_eq!(clamp_expiry(0, 3600), 1);
        assert_eq!(clamp_expiry(100000, 3600), 3600);
        assert_eq!(clamp_expiry(600, 3600), 600);
    }
}

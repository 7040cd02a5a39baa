//! Server-side nonce lifecycle: issuance, expiry, and nonce-count replay
//! protection (spec §4.6).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::digest::{generate_nonce, Challenge};

/// How long an issued nonce remains valid before a fresh challenge with
/// `stale=true` is required.
const NONCE_TTL: Duration = Duration::from_secs(300);

struct NonceEntry {
    realm: String,
    issued: Instant,
    /// Highest `nc` seen for this nonce so far; a request whose `nc` does
    /// not strictly exceed this is a replay and must be rejected.
    max_nc: u32,
}

/// Tracks outstanding server nonces so the registrar/UAS can (a) reject
/// nonce-count replays and (b) decide when to mark a fresh challenge
/// `stale=true` instead of `stale=false` (spec §4.6).
#[derive(Default)]
pub struct NonceTable {
    entries: Mutex<HashMap<String, NonceEntry>>,
}

impl NonceTable {
    pub fn new() -> Self {
        NonceTable { entries: Mutex::new(HashMap::new()) }
    }

    /// Issue a fresh challenge for `realm`. `stale` should be `true` when
    /// this call is replacing a nonce whose digest response verified but
    /// which had itself expired (spec §4.6).
    pub fn issue(&self, realm: &str, qop: Option<&'static str>, stale: bool) -> Challenge {
        let nonce = generate_nonce();
        self.entries.lock().unwrap().insert(
            nonce.clone(),
            NonceEntry { realm: realm.to_string(), issued: Instant::now(), max_nc: 0 },
        );
        Challenge { realm: realm.to_string(), nonce, algorithm: "MD5", qop, stale, opaque: None }
    }

    pub fn is_expired(&self, nonce: &str) -> bool {
        match self.entries.lock().unwrap().get(nonce) {
            Some(e) => e.issued.elapsed() > NONCE_TTL,
            None => true,
        }
    }

    pub fn realm_for(&self, nonce: &str) -> Option<String> {
        self.entries.lock().unwrap().get(nonce).map(|e| e.realm.clone())
    }

    /// Record `nc` for `nonce`, rejecting a value that doesn't strictly
    /// increase (replay of an old request).
    pub fn check_and_advance_nc(&self, nonce: &str, nc: u32) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(nonce) else { return false };
        if nc <= entry.max_nc {
            return false;
        }
        entry.max_nc = nc;
        true
    }

    pub fn forget(&self, nonce: &str) {
        self.entries.lock().unwrap().remove(nonce);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_count_must_strictly_increase() {
        let table = NonceTable::new();
        let challenge = table.issue("example.com", Some("auth"), false);
        assert!(table.check_and_advance_nc(&challenge.nonce, 1));
        assert!(table.check_and_advance_nc(&challenge.nonce, 2));
        assert!(!table.check_and_advance_nc(&challenge.nonce, 2));
        assert!(!table.check_and_advance_nc(&challenge.nonce, 1));
    }

    #[test]
    fn unknown_nonce_is_expired() {
        let table = NonceTable::new();
        assert!(table.is_expired("never-issued"));
    }
}

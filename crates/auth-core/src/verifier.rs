//! Ties digest computation, nonce tracking, and the credential store
//! together into the challenge/verify round trip spec §4.6 describes,
//! plus the retry cap and fake-auth anti-enumeration option.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sipswitch_sip_core::headers::AuthParams;

use crate::credential::{Credential, CredentialStore};
use crate::digest::{self, Challenge};
use crate::error::{Error, Result};
use crate::nonce::NonceTable;

/// At most 3 authentication attempts per transaction (spec §4.6); the
/// fourth is reported as `RetriesExhausted` ("call congestion" upstream).
pub const MAX_AUTH_ATTEMPTS: u8 = 3;

#[derive(Default)]
pub struct AttemptTracker {
    counts: Mutex<HashMap<String, u8>>,
}

impl AttemptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more attempt for `transaction_key`, returning whether
    /// the cap was already reached *before* this attempt (i.e. this
    /// attempt should be rejected outright).
    pub fn record_attempt(&self, transaction_key: &str) -> bool {
        let mut counts = self.counts.lock().unwrap();
        let entry = counts.entry(transaction_key.to_string()).or_insert(0);
        if *entry >= MAX_AUTH_ATTEMPTS {
            return false;
        }
        *entry += 1;
        true
    }

    pub fn forget(&self, transaction_key: &str) {
        self.counts.lock().unwrap().remove(transaction_key);
    }
}

pub struct AuthVerifier {
    pub nonces: NonceTable,
    pub credentials: Arc<dyn CredentialStore>,
    pub attempts: AttemptTracker,
    /// Spec §4.6 "Fake-auth option": unknown accounts get an
    /// indistinguishable challenge rather than an immediate 404.
    pub fake_auth: bool,
}

impl AuthVerifier {
    pub fn new(credentials: Arc<dyn CredentialStore>, fake_auth: bool) -> Self {
        AuthVerifier { nonces: NonceTable::new(), credentials, attempts: AttemptTracker::new(), fake_auth }
    }

    /// Issue a fresh challenge for `realm`, defaulting to `qop=auth`.
    pub fn challenge(&self, realm: &str, stale: bool) -> Challenge {
        self.nonces.issue(realm, Some("auth"), stale)
    }

    /// Verify an `Authorization`/`Proxy-Authorization` header's params
    /// against the credential store for `realm`. `transaction_key`
    /// identifies the transaction for the attempt cap.
    pub async fn verify(
        &self,
        realm: &str,
        method: &str,
        transaction_key: &str,
        params: &AuthParams,
    ) -> Result<()> {
        if !self.attempts.record_attempt(transaction_key) {
            return Err(Error::RetriesExhausted);
        }

        let username = params.get("username").unwrap_or_default();
        let nonce = params.get("nonce").unwrap_or_default();
        let uri = params.get("uri").unwrap_or_default();
        let received = params.get("response").unwrap_or_default();

        if self.nonces.is_expired(nonce) {
            return Err(Error::StaleNonce);
        }

        if let Some(nc_hex) = params.get("nc") {
            let nc = u32::from_str_radix(nc_hex, 16).unwrap_or(0);
            if !self.nonces.check_and_advance_nc(nonce, nc) {
                return Err(Error::StaleNonce);
            }
        }

        let credential = self
            .credentials
            .lookup(realm, username)
            .await
            .ok_or_else(|| Error::NoCredential(realm.to_string()))?;

        let ha1 = match &credential {
            Credential::Plain(secret) => digest::ha1(username, realm, secret),
            Credential::PrecomputedHa1(hash) => digest::ha1_from_hash(hash),
        };
        let ha2 = digest::ha2(method, uri);

        let computed = match (params.get("qop"), params.get("nc"), params.get("cnonce")) {
            (Some(qop), Some(nc), Some(cnonce)) => digest::response_with_qop(&ha1, nonce, nc, cnonce, qop, &ha2),
            _ => digest::response_no_qop(&ha1, nonce, &ha2),
        };

        if digest::responses_match(&computed, received) {
            self.attempts.forget(transaction_key);
            Ok(())
        } else {
            Err(Error::ResponseMismatch)
        }
    }

    /// When `fake_auth` is enabled, an unknown account still gets a
    /// plausible challenge instead of a distinguishable 404 (spec §4.6).
    pub fn challenge_for_unknown_account(&self, realm: &str) -> Option<Challenge> {
        if self.fake_auth {
            Some(self.challenge(realm, false))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticCredentialStore;

    fn make_verifier() -> AuthVerifier {
        let mut store = StaticCredentialStore::new();
        store.insert("example.com", "bob", Credential::Plain("zanzibar".into()));
        AuthVerifier::new(Arc::new(store), true)
    }

    #[tokio::test]
    async fn full_challenge_response_round_trip() {
        let verifier = make_verifier();
        let challenge = verifier.challenge("example.com", false);

        let ha1 = digest::ha1("bob", "example.com", "zanzibar");
        let ha2 = digest::ha2("REGISTER", "sip:example.com");
        let response = digest::response_no_qop(&ha1, &challenge.nonce, &ha2);

        let mut params = AuthParams::default();
        params.set("username", "bob");
        params.set("nonce", challenge.nonce.clone());
        params.set("uri", "sip:example.com");
        params.set("response", response);

        verifier.verify("example.com", "REGISTER", "txn-1", &params).await.unwrap();
    }

    #[tokio::test]
    async fn wrong_response_is_rejected() {
        let verifier = make_verifier();
        let challenge = verifier.challenge("example.com", false);
        let mut params = AuthParams::default();
        params.set("username", "bob");
        params.set("nonce", challenge.nonce.clone());
        params.set("uri", "sip:example.com");
        params.set("response", "deadbeef".repeat(4));

        let err = verifier.verify("example.com", "REGISTER", "txn-2", &params).await.unwrap_err();
        assert_eq!(err, Error::ResponseMismatch);
    }

    #[tokio::test]
    async fn fourth_attempt_is_rejected_outright() {
        let verifier = make_verifier();
        let challenge = verifier.challenge("example.com", false);
        let mut params = AuthParams::default();
        params.set("username", "bob");
        params.set("nonce", challenge.nonce.clone());
        params.set("uri", "sip:example.com");
        params.set("response", "deadbeef".repeat(4));

        for _ in 0..3 {
            let _ = verifier.verify("example.com", "REGISTER", "txn-3", &params).await;
        }
        let err = verifier.verify("example.com", "REGISTER", "txn-3", &params).await.unwrap_err();
        assert_eq!(err, Error::RetriesExhausted);
    }

    #[tokio::test]
    async fn unknown_account_with_fake_auth_gets_challenge_not_error() {
        let verifier = make_verifier();
        assert!(verifier.challenge_for_unknown_account("example.com").is_some());
    }
}

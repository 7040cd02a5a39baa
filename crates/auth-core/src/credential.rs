//! The host-provided credential lookup seam (spec §3: "Peer/Account
//! (consumed from host)"). The core stores no persistent account state;
//! it only asks whatever the channel driver plugs in here.

use async_trait::async_trait;

/// Either the plaintext shared secret or a precomputed `MD5(user:realm:pw)`
/// hash, matching spec §4.6's "use the stored `HA1` directly if the
/// account carries an MD5 secret".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Plain(String),
    PrecomputedHa1(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up the credential for `username` in `realm`. `None` means the
    /// account is unknown -- callers enforcing spec §4.6's fake-auth
    /// option should still issue an indistinguishable challenge rather
    /// than branch on this at the transport-visible level.
    async fn lookup(&self, realm: &str, username: &str) -> Option<Credential>;
}

/// Reference in-memory implementation for tests and for a host that has
/// no richer store yet.
#[derive(Default)]
pub struct StaticCredentialStore {
    entries: std::collections::HashMap<(String, String), Credential>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, realm: impl Into<String>, username: impl Into<String>, credential: Credential) {
        self.entries.insert((realm.into(), username.into()), credential);
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn lookup(&self, realm: &str, username: &str) -> Option<Credential> {
        self.entries.get(&(realm.to_string(), username.to_string())).cloned()
    }
}

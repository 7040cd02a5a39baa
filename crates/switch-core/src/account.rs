//! The `Account`/`Binding` host collaborator traits (spec §3 "Peer/Account
//! (consumed from host)", spec §9 design note: "Define traits for
//! `Account` (authenticates) and `Binding` (resolves) and implement them
//! separately").
//!
//! The core stores no persistent peer state of its own -- every lookup
//! goes through these traits, with [`sipswitch_auth_core::CredentialStore`]
//! and [`sipswitch_registrar_core::BindingStore`] covering the
//! authentication and registration-persistence slices specifically.

use async_trait::async_trait;

use sipswitch_sip_core::sdp::{Codec, UdpEc};
use sipswitch_sip_transport::NatMode;

/// A read-only view of one configured peer/user/friend (spec §3).
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub name: String,
    pub realm: String,
    /// `None` when the account authenticates only inbound via the
    /// registrar (no secret needed for outbound registration).
    pub secret: Option<String>,
    pub permitted_audio_codecs: Vec<Codec>,
    pub video_enabled: bool,
    pub t38_enabled: bool,
    pub t38_udp_ec_preference: UdpEc,
    pub nat_mode: NatMode,
    /// `0` means unlimited (spec §9: "port as an enforced feature, not
    /// optional").
    pub call_limit: u32,
    pub mailbox: Option<String>,
    /// Address-based access control; empty means "no restriction."
    pub acl: Vec<String>,
}

/// Resolves and authenticates peers/accounts (spec §3/§9). Implemented by
/// the host's config/database layer (out of scope, spec §1's "dial-plan
/// engine ... configuration file parsing ... realtime database lookup").
#[async_trait]
pub trait Account: Send + Sync {
    async fn lookup(&self, name: &str) -> Option<AccountInfo>;

    /// Whether `remote_addr` is permitted to use this account's ACL,
    /// `true` when the account carries no ACL at all.
    fn acl_permits(&self, account: &AccountInfo, remote_addr: &str) -> bool {
        account.acl.is_empty() || account.acl.iter().any(|a| a == remote_addr)
    }
}

/// Where to send traffic for a resolved destination (spec §3 "Binding
/// (registrar side)" for inbound; this trait covers outbound resolution
/// of a dial string to a peer/account, which the source's function
/// pointer tables on `sip_peer`/`sip_user`/`sip_registry` covered).
#[async_trait]
pub trait Binding: Send + Sync {
    /// Resolve a request-URI user part to an account name, if any account
    /// claims it.
    async fn resolve(&self, user: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoAcl;

    #[async_trait]
    impl Account for NoAcl {
        async fn lookup(&self, _name: &str) -> Option<AccountInfo> {
            None
        }
    }

    #[test]
    fn empty_acl_permits_everything() {
        let info = AccountInfo {
            name: "bob".into(),
            realm: "example.com".into(),
            secret: None,
            permitted_audio_codecs: vec![],
            video_enabled: false,
            t38_enabled: false,
            t38_udp_ec_preference: UdpEc::Redundancy,
            nat_mode: NatMode::Never,
            call_limit: 0,
            mailbox: None,
            acl: vec![],
        };
        assert!(NoAcl.acl_permits(&info, "203.0.113.9"));
    }

    #[test]
    fn nonempty_acl_requires_match() {
        let mut info = AccountInfo {
            name: "bob".into(),
            realm: "example.com".into(),
            secret: None,
            permitted_audio_codecs: vec![],
            video_enabled: false,
            t38_enabled: false,
            t38_udp_ec_preference: UdpEc::Redundancy,
            nat_mode: NatMode::Never,
            call_limit: 0,
            mailbox: None,
            acl: vec!["203.0.113.9".into()],
        };
        assert!(NoAcl.acl_permits(&info, "203.0.113.9"));
        info.acl = vec!["198.51.100.1".into()];
        assert!(!NoAcl.acl_permits(&info, "203.0.113.9"));
    }
}

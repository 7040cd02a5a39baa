//! Typed `Config`/`PeerConfig` layered over `infra_common::config::RawConfig`
//! (spec §6 "Configuration"), following the teacher's convention of a
//! typed config struct with `Default` plus a loader over a generic
//! key-value parser (seen in `dialog-core::config`). Unknown keys are
//! warned-and-ignored, not fatal (SPEC_FULL.md §3).

use std::net::IpAddr;

use sipswitch_infra_common::config::RawConfig;
use sipswitch_sip_transport::NatMode;
use tracing::warn;

use crate::channel::DtmfMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanReinvite {
    Yes,
    No,
    Update,
}

impl CanReinvite {
    fn from_config_str(s: &str) -> CanReinvite {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => CanReinvite::Yes,
            "update" => CanReinvite::Update,
            _ => CanReinvite::No,
        }
    }
}

/// `qualify = n|yes|no` (spec §6): either disabled, a default interval, or
/// an explicit millisecond round-trip threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualify {
    Disabled,
    Millis(u32),
}

impl Qualify {
    fn from_config_str(s: &str) -> Qualify {
        match s.trim().to_ascii_lowercase().as_str() {
            "no" => Qualify::Disabled,
            "yes" => Qualify::Millis(2000),
            other => other.parse().map(Qualify::Millis).unwrap_or(Qualify::Disabled),
        }
    }
}

/// An outbound `register = user[:secret[:authuser]]@host[:port][/contact]`
/// entry (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterEntry {
    pub user: String,
    pub secret: Option<String>,
    pub auth_user: Option<String>,
    pub host: String,
    pub port: u16,
    pub contact: Option<String>,
}

/// Parse one `register =` value (spec §6 syntax).
pub fn parse_register_entry(raw: &str) -> Option<RegisterEntry> {
    let (creds_and_host, contact) = match raw.split_once('/') {
        Some((l, r)) => (l, Some(r.to_string())),
        None => (raw, None),
    };
    let (creds, host_part) = creds_and_host.split_once('@')?;
    let mut creds_parts = creds.splitn(3, ':');
    let user = creds_parts.next()?.to_string();
    let secret = creds_parts.next().map(str::to_string).filter(|s| !s.is_empty());
    let auth_user = creds_parts.next().map(str::to_string).filter(|s| !s.is_empty());

    let (host, port) = match host_part.split_once(':') {
        Some((h, p)) => (h.to_string(), p.parse().ok()?),
        None => (host_part.to_string(), 5060),
    };

    Some(RegisterEntry { user, secret, auth_user, host, port, contact })
}

/// Per-peer section settings (spec §6: "one section per user/peer/friend").
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub name: String,
    pub nat: NatMode,
    pub dtmf_mode: DtmfMode,
    pub can_reinvite: CanReinvite,
    pub qualify: Qualify,
    pub call_limit: u32,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            name: String::new(),
            nat: NatMode::Never,
            dtmf_mode: DtmfMode::Rfc2833,
            can_reinvite: CanReinvite::No,
            qualify: Qualify::Disabled,
            call_limit: 0,
        }
    }
}

/// `[general]`/`[authentication]` plus per-peer config (spec §6).
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: IpAddr,
    pub bind_port: u16,
    pub extern_ip: Option<IpAddr>,
    pub extern_host: Option<String>,
    pub extern_refresh_secs: u32,
    pub stun_server: Option<(String, u16)>,
    pub t38_udptl_support: bool,
    pub allow_guest: bool,
    pub always_auth_reject: bool,
    pub pedantic: bool,
    pub realm: String,
    pub max_expiry: u32,
    pub default_expiry: u32,
    pub registrations: Vec<RegisterEntry>,
    pub peers: Vec<PeerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".parse().unwrap(),
            bind_port: 5060,
            extern_ip: None,
            extern_host: None,
            extern_refresh_secs: 0,
            stun_server: None,
            t38_udptl_support: false,
            allow_guest: false,
            always_auth_reject: false,
            pedantic: false,
            realm: "asterisk".into(),
            max_expiry: 3600,
            default_expiry: 3600,
            registrations: Vec::new(),
            peers: Vec::new(),
        }
    }
}

impl Config {
    /// Build a typed [`Config`] from a parsed [`RawConfig`], warning (not
    /// failing) on keys this engine doesn't recognize (spec §6).
    pub fn from_raw(raw: &RawConfig) -> Config {
        let mut config = Config::default();

        if let Some(general) = raw.section("general") {
            for (key, value) in &general.entries {
                match key.as_str() {
                    "bindaddr" => {
                        if let Ok(addr) = value.parse() {
                            config.bind_addr = addr;
                        }
                    }
                    "bindport" => {
                        if let Ok(port) = value.parse() {
                            config.bind_port = port;
                        }
                    }
                    "externip" => config.extern_ip = value.parse().ok(),
                    "externhost" => config.extern_host = Some(value.clone()),
                    "externrefresh" => config.extern_refresh_secs = value.parse().unwrap_or(0),
                    "stunserver_host" => {
                        let port = config.stun_server.as_ref().map(|(_, p)| *p).unwrap_or(3478);
                        config.stun_server = Some((value.clone(), port));
                    }
                    "stunserver_port" => {
                        let host = config.stun_server.as_ref().map(|(h, _)| h.clone()).unwrap_or_default();
                        if let Ok(port) = value.parse() {
                            config.stun_server = Some((host, port));
                        }
                    }
                    "t38udptlsupport" => config.t38_udptl_support = is_yes(value),
                    "allowguest" => config.allow_guest = is_yes(value),
                    "alwaysauthreject" => config.always_auth_reject = is_yes(value),
                    "pedantic" => config.pedantic = is_yes(value),
                    "maxexpiry" => config.max_expiry = value.parse().unwrap_or(config.max_expiry),
                    "defaultexpiry" => config.default_expiry = value.parse().unwrap_or(config.default_expiry),
                    "register" => {
                        match parse_register_entry(value) {
                            Some(entry) => config.registrations.push(entry),
                            None => warn!(value, "malformed register= entry, ignoring"),
                        }
                    }
                    _ => warn!(key, "unrecognized [general] config key, ignoring"),
                }
            }
        }

        if let Some(auth) = raw.section("authentication") {
            if let Some(realm) = auth.get("realm") {
                config.realm = realm.to_string();
            }
        }

        for (name, section) in raw.peer_sections() {
            let mut peer = PeerConfig { name: name.to_string(), ..PeerConfig::default() };
            for (key, value) in &section.entries {
                match key.as_str() {
                    "nat" => peer.nat = NatMode::from_config_str(value),
                    "dtmfmode" => peer.dtmf_mode = DtmfMode::from_config_str(value),
                    "canreinvite" => peer.can_reinvite = CanReinvite::from_config_str(value),
                    "qualify" => peer.qualify = Qualify::from_config_str(value),
                    "call_limit" | "calllimit" => peer.call_limit = value.parse().unwrap_or(0),
                    _ => warn!(peer = name, key, "unrecognized peer config key, ignoring"),
                }
            }
            config.peers.push(peer);
        }

        config
    }

    pub fn parse(input: &str) -> Config {
        Config::from_raw(&sipswitch_infra_common::config::parse(input))
    }
}

fn is_yes(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "yes" | "true" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_general_section_and_defaults() {
        let input = "[general]\nbindaddr=0.0.0.0\nbindport=5080\nrealm=example.com\nallowguest=yes\n";
        let config = Config::parse(input);
        assert_eq!(config.bind_port, 5080);
        assert!(config.allow_guest);
    }

    #[test]
    fn parses_peer_section_with_nat_and_qualify() {
        let input = "[bob]\nnat=rfc3581\nqualify=2000\ncall_limit=2\n";
        let config = Config::parse(input);
        let bob = &config.peers[0];
        assert_eq!(bob.name, "bob");
        assert_eq!(bob.nat, NatMode::Rfc3581);
        assert_eq!(bob.qualify, Qualify::Millis(2000));
        assert_eq!(bob.call_limit, 2);
    }

    #[test]
    fn parses_register_entry_with_secret_and_contact() {
        let entry = parse_register_entry("bob:zanzibar@sip.example.com:5080/1000").unwrap();
        assert_eq!(entry.user, "bob");
        assert_eq!(entry.secret.as_deref(), Some("zanzibar"));
        assert_eq!(entry.host, "sip.example.com");
        assert_eq!(entry.port, 5080);
        assert_eq!(entry.contact.as_deref(), Some("1000"));
    }

    #[test]
    fn parses_register_entry_without_port_or_contact() {
        let entry = parse_register_entry("bob:zanzibar@sip.example.com").unwrap();
        assert_eq!(entry.port, 5060);
        assert_eq!(entry.contact, None);
    }

    #[test]
    fn qualify_no_is_disabled_yes_defaults_to_2000() {
        assert_eq!(Qualify::from_config_str("no"), Qualify::Disabled);
        assert_eq!(Qualify::from_config_str("yes"), Qualify::Millis(2000));
        assert_eq!(Qualify::from_config_str("500"), Qualify::Millis(500));
    }
}

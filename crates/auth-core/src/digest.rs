//! RFC 2617/3261 digest authentication: `HA1`/`HA2`/`response` computation,
//! challenge generation, and nonce-count tracking (spec §4.6).

use std::fmt::Write as _;

use rand::RngCore;

/// A challenge this registrar/UAS issues in a `401`/`407` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub nonce: String,
    pub algorithm: &'static str,
    pub qop: Option<&'static str>,
    /// Set when the nonce being replaced had a valid response but had
    /// expired/rolled over -- tells the UAC to retry with the new nonce
    /// using the same credentials rather than re-prompting (spec §4.6).
    pub stale: bool,
    pub opaque: Option<String>,
}

impl Challenge {
    pub fn to_header_value(&self) -> String {
        let mut out = format!(
            r#"Digest realm="{}", nonce="{}", algorithm={}"#,
            self.realm, self.nonce, self.algorithm
        );
        if let Some(qop) = self.qop {
            let _ = write!(out, r#", qop="{qop}""#);
        }
        if self.stale {
            out.push_str(", stale=true");
        }
        if let Some(opaque) = &self.opaque {
            let _ = write!(out, r#", opaque="{opaque}""#);
        }
        out
    }
}

/// A random 32-bit hex nonce (spec §4.6: "a random 32-bit hex nonce"),
/// rendered as 8 lowercase hex digits.
pub fn generate_nonce() -> String {
    let n = rand::thread_rng().next_u32();
    format!("{n:08x}")
}

pub fn md5_hex(input: &str) -> String {
    let digest = md5::compute(input.as_bytes());
    format!("{digest:x}")
}

/// `HA1 = MD5(username:realm:secret)`. Use [`ha1_from_hash`] instead when
/// the account stores a precomputed MD5 hash (spec §4.6).
pub fn ha1(username: &str, realm: &str, secret: &str) -> String {
    md5_hex(&format!("{username}:{realm}:{secret}"))
}

/// Pass an already-computed HA1 through unchanged, for accounts whose
/// stored credential *is* the MD5 hash rather than the plaintext secret.
pub fn ha1_from_hash(stored_hash: &str) -> String {
    stored_hash.to_ascii_lowercase()
}

/// `HA2 = MD5(method:uri)`.
pub fn ha2(method: &str, uri: &str) -> String {
    md5_hex(&format!("{method}:{uri}"))
}

/// `response = MD5(HA1:nonce:HA2)` when `qop` is absent.
pub fn response_no_qop(ha1: &str, nonce: &str, ha2: &str) -> String {
    md5_hex(&format!("{ha1}:{nonce}:{ha2}"))
}

/// `response = MD5(HA1:nonce:nc:cnonce:qop:HA2)` when `qop=auth`.
pub fn response_with_qop(ha1: &str, nonce: &str, nc: &str, cnonce: &str, qop: &str, ha2: &str) -> String {
    md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}"))
}

/// Case-insensitive hex comparison (spec §4.6: "Compare case-insensitively
/// as hex").
pub fn responses_match(computed: &str, received: &str) -> bool {
    computed.eq_ignore_ascii_case(received)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc_vector_style_digest() {
        // spec §8 scenario S2.
        let ha1 = ha1("bob", "example.com", "zanzibar");
        let ha2 = ha2("REGISTER", "sip:example.com");
        let resp = response_no_qop(&ha1, "dcd98b7102dd2f0e8b11d0f600bfb0c093", &ha2);
        assert_eq!(resp.len(), 32);
        assert!(resp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn qop_response_differs_from_no_qop() {
        let ha1 = ha1("bob", "example.com", "zanzibar");
        let ha2 = ha2("REGISTER", "sip:example.com");
        let plain = response_no_qop(&ha1, "nonce1", &ha2);
        let qop = response_with_qop(&ha1, "nonce1", "00000001", "cnonce1", "auth", &ha2);
        assert_ne!(plain, qop);
    }

    #[test]
    fn stale_challenge_renders_flag() {
        let c = Challenge {
            realm: "example.com".into(),
            nonce: "abcd1234".into(),
            algorithm: "MD5",
            qop: Some("auth"),
            stale: true,
            opaque: None,
        };
        let v = c.to_header_value();
        assert!(v.contains("stale=true"));
        assert!(v.contains(r#"qop="auth""#));
    }
}

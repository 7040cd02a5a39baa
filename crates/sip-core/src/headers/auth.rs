//! Digest challenge/credential header value parsing, shared by
//! `WWW-Authenticate`/`Proxy-Authenticate` (challenges) and
//! `Authorization`/`Proxy-Authorization` (credentials). Both are the same
//! `scheme name=value, name=value, ...` grammar (RFC 2617 §3.2.1), so one
//! parser covers both directions; `auth-core` attaches meaning to the
//! fields (spec §4.6).

use std::collections::BTreeMap;
use std::fmt;

/// Only `Digest` is produced by this engine (spec §4.6); `Other` preserves
/// anything else seen on the wire without choking on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    Digest,
    Other(String),
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::Digest => f.write_str("Digest"),
            AuthScheme::Other(s) => f.write_str(s),
        }
    }
}

/// A parsed `Digest <param>=<value>, ...` header value. Order is not
/// preserved (auth params are looked up by name, never reserialized
/// byte-for-byte); quoted values have their quotes stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthParams(pub BTreeMap<String, String>);

impl AuthParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Parse the parameter list following the scheme token, e.g.
    /// `realm="example.com", nonce="...", qop=auth, nc=00000001`.
    pub fn parse(input: &str) -> AuthParams {
        let mut map = BTreeMap::new();
        for part in split_params(input) {
            let Some((k, v)) = part.split_once('=') else { continue };
            let k = k.trim().to_string();
            let v = v.trim();
            let v = v.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(v);
            map.insert(k, v.to_string());
        }
        AuthParams(map)
    }

    /// Which param names are conventionally quoted on the wire (RFC 2617).
    fn is_quoted(key: &str) -> bool {
        matches!(
            key,
            "realm" | "nonce" | "uri" | "cnonce" | "opaque" | "username" | "domain" | "response" | "digest-uri"
        )
    }

    pub fn serialize(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| {
                if Self::is_quoted(k) {
                    format!("{k}=\"{v}\"")
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Split on commas that are outside double quotes (values may contain
/// stray commas inside `opaque=`/`nonce=` in the wild, though rare).
fn split_params(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(input[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = input[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

/// Split `Digest realm=..., nonce=...` into the scheme token and the
/// parameter tail, used by both challenge and credential parsing.
pub fn split_scheme(input: &str) -> (AuthScheme, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("digest") => (AuthScheme::Digest, rest.trim()),
        Some((scheme, rest)) => (AuthScheme::Other(scheme.to_string()), rest.trim()),
        None => (AuthScheme::Other(input.to_string()), ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_digest_challenge() {
        let (scheme, rest) = split_scheme(
            r#"Digest realm="example.com", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", algorithm=MD5, qop="auth""#,
        );
        assert_eq!(scheme, AuthScheme::Digest);
        let params = AuthParams::parse(rest);
        assert_eq!(params.get("realm"), Some("example.com"));
        assert_eq!(params.get("algorithm"), Some("MD5"));
        assert_eq!(params.get("qop"), Some("auth"));
    }

    #[test]
    fn serialize_quotes_known_fields_only() {
        let mut p = AuthParams::default();
        p.set("realm", "example.com");
        p.set("nc", "00000001");
        let s = p.serialize();
        assert!(s.contains(r#"realm="example.com""#));
        assert!(s.contains("nc=00000001"));
    }
}

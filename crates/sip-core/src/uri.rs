use std::collections::BTreeMap;
use std::fmt;

use crate::error::Error;

/// A `sip:`/`sips:` URI. Parsing is intentionally permissive about
/// extension parameters (stored in `params`, order preserved) since the
/// dialog layer round-trips unrecognized ones (e.g. `Replaces=`) verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub secure: bool,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    /// Order-preserving; `;lr`, `;tag`, `;expires=`, `;Replaces=` all land here.
    pub params: Vec<(String, Option<String>)>,
    pub headers: BTreeMap<String, String>,
}

impl Uri {
    pub fn new(host: impl Into<String>) -> Self {
        Uri { secure: false, user: None, host: host.into(), port: None, params: Vec::new(), headers: BTreeMap::new() }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref())
    }

    pub fn has_flag_param(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        if let Some(entry) = self.params.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            entry.1 = value;
        } else {
            self.params.push((name, value));
        }
    }

    /// `true` when the top Route URI carries `;lr` (loose routing, spec §4.5).
    pub fn is_loose_route(&self) -> bool {
        self.has_flag_param("lr")
    }

    /// Address-only form used for `uri="..."` in a digest `Authorization`
    /// header and for matching request-URI during transaction routing:
    /// drops params/headers.
    pub fn addr_spec(&self) -> String {
        let scheme = if self.secure { "sips" } else { "sip" };
        match &self.user {
            Some(u) => format!("{scheme}:{u}@{}", self.host_port()),
            None => format!("{scheme}:{}", self.host_port()),
        }
    }

    fn host_port(&self) -> String {
        match self.port {
            Some(p) => format!("{}:{p}", self.host),
            None => self.host.clone(),
        }
    }

    pub fn parse(input: &str) -> Result<Uri, Error> {
        let input = input.trim();
        let input = input.strip_prefix('<').and_then(|s| s.strip_suffix('>')).unwrap_or(input);
        let secure = if let Some(rest) = input.strip_prefix("sips:") {
            let _ = rest;
            true
        } else if input.starts_with("sip:") {
            false
        } else {
            return Err(Error::InvalidUri(input.to_string()));
        };
        let rest = if secure { &input[5..] } else { &input[4..] };

        // split off ;params and ?headers, stopping params at the first '?'
        let (before_headers, headers_part) = match rest.find('?') {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
            None => (rest, None),
        };

        let mut parts = before_headers.splitn(2, ';');
        let userhost = parts.next().unwrap_or("");
        let params_str = parts.next();

        let (user, hostport) = match userhost.rsplit_once('@') {
            Some((u, h)) => (Some(u.to_string()), h),
            None => (None, userhost),
        };
        if hostport.is_empty() {
            return Err(Error::InvalidUri(input.to_string()));
        }
        let (host, port) = match hostport.rsplit_once(':') {
            Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty() => {
                (h.to_string(), p.parse::<u16>().ok())
            }
            _ => (hostport.to_string(), None),
        };

        let mut params = Vec::new();
        if let Some(p) = params_str {
            for seg in p.split(';') {
                if seg.is_empty() {
                    continue;
                }
                match seg.split_once('=') {
                    Some((k, v)) => params.push((k.to_string(), Some(v.to_string()))),
                    None => params.push((seg.to_string(), None)),
                }
            }
        }

        let mut headers = BTreeMap::new();
        if let Some(h) = headers_part {
            for seg in h.split('&') {
                if let Some((k, v)) = seg.split_once('=') {
                    headers.insert(k.to_string(), v.to_string());
                }
            }
        }

        Ok(Uri { secure, user, host, port, params, headers })
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr_spec())?;
        for (k, v) in &self.params {
            match v {
                Some(v) => write!(f, ";{k}={v}")?,
                None => write!(f, ";{k}")?,
            }
        }
        if !self.headers.is_empty() {
            write!(f, "?")?;
            let joined = self.headers.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
            write!(f, "{joined}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_uri() {
        let u = Uri::parse("sip:alice@atlanta.example:5061;transport=tcp").unwrap();
        assert_eq!(u.user.as_deref(), Some("alice"));
        assert_eq!(u.host, "atlanta.example");
        assert_eq!(u.port, Some(5061));
        assert_eq!(u.param("transport"), Some(Some("tcp")));
    }

    #[test]
    fn parses_loose_route_flag() {
        let u = Uri::parse("<sip:proxy.example.com;lr>").unwrap();
        assert!(u.is_loose_route());
        assert!(u.user.is_none());
    }

    #[test]
    fn parses_replaces_param_with_escaped_value() {
        let u = Uri::parse("sip:alice@atlanta.example?Replaces=abc%3Bto-tag%3D1").unwrap();
        assert_eq!(u.headers.get("Replaces").map(String::as_str), Some("abc%3Bto-tag%3D1"));
    }

    #[test]
    fn display_round_trips_addr_spec() {
        let u = Uri::parse("sip:bob@biloxi.example").unwrap();
        assert_eq!(u.to_string(), "sip:bob@biloxi.example");
    }
}

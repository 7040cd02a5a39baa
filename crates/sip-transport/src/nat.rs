//! NAT traversal mode and the rewrite rules applied before a message goes
//! out the socket (spec §4.3/§4.9).

use std::net::SocketAddr;

use sipswitch_sip_core::headers::HeaderName;
use sipswitch_sip_core::message::Message;

/// Per-peer NAT traversal mode (config key `nat`, spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NatMode {
    #[default]
    Never,
    Route,
    Rfc3581,
    Always,
}

impl NatMode {
    pub fn from_config_str(s: &str) -> NatMode {
        match s.trim().to_ascii_lowercase().as_str() {
            "route" => NatMode::Route,
            "rfc3581" => NatMode::Rfc3581,
            "always" | "yes" => NatMode::Always,
            _ => NatMode::Never,
        }
    }

    /// Whether STUN discovery is required before a first send under this
    /// mode (spec §4.9: deferred send + Binding Request).
    pub fn needs_stun(&self) -> bool {
        matches!(self, NatMode::Always)
    }
}

/// Decide where an outgoing message is actually sent, given the dialog's
/// resolved target and (if known) the source address of the last inbound
/// request on this dialog (spec §4.3).
pub fn resolve_send_target(mode: NatMode, resolved_target: SocketAddr, last_request_source: Option<SocketAddr>) -> SocketAddr {
    match mode {
        NatMode::Never => resolved_target,
        NatMode::Route => last_request_source.unwrap_or(resolved_target),
        NatMode::Rfc3581 => resolved_target,
        NatMode::Always => last_request_source.unwrap_or(resolved_target),
    }
}

/// Rewrite `Contact`, the topmost `Via`'s `sent-by`, and any `m=`/`c=`
/// lines in the SDP body to `mapped` -- the address STUN (or, on
/// timeout, the configured external IP) resolved for us (spec §4.9). The
/// rewrite is applied to structured values before serialization, never by
/// mutating raw bytes (spec §9 design note).
pub fn rewrite_for_mapped_address(msg: &mut Message, mapped: SocketAddr) {
    rewrite_contact(msg, mapped);
    rewrite_topmost_via(msg, mapped);
    rewrite_sdp_body(msg, mapped);
}

fn rewrite_contact(msg: &mut Message, mapped: SocketAddr) {
    let headers = msg.headers_mut();
    let Some(existing) = headers.get(&HeaderName::Contact) else { return };
    if let Ok(mut uri) = sipswitch_sip_core::uri::Uri::parse(existing) {
        uri.host = mapped.ip().to_string();
        uri.port = Some(mapped.port());
        let new_value = uri.to_string();
        replace_first(headers, &HeaderName::Contact, new_value);
    }
}

fn rewrite_topmost_via(msg: &mut Message, mapped: SocketAddr) {
    let headers = msg.headers_mut();
    let Some(existing) = headers.get(&HeaderName::Via).map(str::to_string) else { return };
    let rewritten = rewrite_via_sent_by(&existing, mapped);
    replace_first(headers, &HeaderName::Via, rewritten);
}

/// A Via value is `SIP/2.0/UDP <sent-by>;branch=...;...`; only the
/// `sent-by` host[:port] token is replaced.
fn rewrite_via_sent_by(via: &str, mapped: SocketAddr) -> String {
    let mut parts = via.splitn(2, ';');
    let head = parts.next().unwrap_or(via);
    let rest = parts.next();
    let Some((proto, _sent_by)) = head.rsplit_once(' ') else { return via.to_string() };
    let new_head = format!("{proto} {}:{}", mapped.ip(), mapped.port());
    match rest {
        Some(r) => format!("{new_head};{r}"),
        None => new_head,
    }
}

fn replace_first(headers: &mut sipswitch_sip_core::headers::Headers, name: &HeaderName, value: String) {
    for h in headers.0.iter_mut() {
        if &h.name == name {
            h.value = value;
            return;
        }
    }
}

fn rewrite_sdp_body(msg: &mut Message, mapped: SocketAddr) {
    let is_sdp = msg
        .headers()
        .get(&HeaderName::ContentType)
        .map(|ct| ct.trim().eq_ignore_ascii_case("application/sdp"))
        .unwrap_or(false);
    if !is_sdp {
        return;
    }
    let body = msg.body();
    let text = String::from_utf8_lossy(body).to_string();
    let rewritten = rewrite_sdp_text(&text, mapped);
    match msg {
        Message::Request(r) => r.body = rewritten.into_bytes(),
        Message::Response(r) => r.body = rewritten.into_bytes(),
    }
}

fn rewrite_sdp_text(text: &str, mapped: SocketAddr) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if let Some(rest) = trimmed.strip_prefix("c=IN IP4 ") {
            let _ = rest;
            out.push_str(&format!("c=IN IP4 {}\r\n", mapped.ip()));
        } else if trimmed.starts_with("m=") {
            let mut parts: Vec<&str> = trimmed.split_whitespace().collect();
            if parts.len() > 1 {
                let port_str = mapped.port().to_string();
                parts[1] = &port_str;
                out.push_str(&parts.join(" "));
                out.push_str("\r\n");
            } else {
                out.push_str(trimmed);
                out.push_str("\r\n");
            }
        } else {
            out.push_str(trimmed);
            out.push_str("\r\n");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_mode_sends_to_last_source() {
        let resolved: SocketAddr = "198.51.100.1:5060".parse().unwrap();
        let source: SocketAddr = "203.0.113.9:38124".parse().unwrap();
        assert_eq!(resolve_send_target(NatMode::Route, resolved, Some(source)), source);
        assert_eq!(resolve_send_target(NatMode::Never, resolved, Some(source)), resolved);
    }

    #[test]
    fn rewrites_via_sent_by_preserving_params() {
        let via = "SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bK1;rport";
        let mapped: SocketAddr = "203.0.113.9:38124".parse().unwrap();
        let rewritten = rewrite_via_sent_by(via, mapped);
        assert_eq!(rewritten, "SIP/2.0/UDP 203.0.113.9:38124;branch=z9hG4bK1;rport");
    }

    #[test]
    fn rewrites_sdp_connection_and_media_port() {
        let sdp = "v=0\r\no=- 1 1 IN IP4 10.0.0.5\r\nc=IN IP4 10.0.0.5\r\nt=0 0\r\nm=audio 30000 RTP/AVP 0\r\n";
        let mapped: SocketAddr = "203.0.113.9:40000".parse().unwrap();
        let out = rewrite_sdp_text(sdp, mapped);
        assert!(out.contains("c=IN IP4 203.0.113.9"));
        assert!(out.contains("m=audio 40000 RTP/AVP 0"));
    }
}

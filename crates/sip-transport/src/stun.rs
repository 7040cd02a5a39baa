//! Minimal STUN (RFC 5389) Binding Request/Response codec, just enough
//! for the NAT/STUN coordination spec §4.9 describes: discover our public
//! mapping and classify inbound datagrams as STUN-vs-SIP by the 20-byte
//! header magic (spec §4.3). Grounded in the hand-rolled STUN codec
//! pattern (magic cookie, XOR-MAPPED-ADDRESS) used elsewhere in the
//! example pack's ICE layer; this trims it to Binding Request/Response
//! only -- no ICE priority/USE-CANDIDATE attributes, this isn't an ICE
//! agent.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::RngCore;

use crate::error::{Error, Result};

const STUN_HEADER_SIZE: usize = 20;
const STUN_MAGIC_COOKIE: u32 = 0x2112_A442;
const BINDING_REQUEST: u16 = 0x0001;
const BINDING_RESPONSE: u16 = 0x0101;
const BINDING_ERROR_RESPONSE: u16 = 0x0111;
const XOR_MAPPED_ADDRESS: u16 = 0x0020;
const MAPPED_ADDRESS: u16 = 0x0001;

pub type TransactionId = [u8; 12];

/// First two bits of a STUN message type are always 0, and the magic
/// cookie at offset 4 is fixed -- that's the "20-byte header magic" spec
/// §4.3 uses to route a datagram to the STUN table instead of the SIP
/// pipeline.
pub fn looks_like_stun(datagram: &[u8]) -> bool {
    datagram.len() >= STUN_HEADER_SIZE
        && datagram[0] & 0xC0 == 0
        && u32::from_be_bytes([datagram[4], datagram[5], datagram[6], datagram[7]]) == STUN_MAGIC_COOKIE
}

pub fn new_transaction_id() -> TransactionId {
    let mut id = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut id);
    id
}

/// Encode a STUN Binding Request with no attributes.
pub fn encode_binding_request(txid: &TransactionId) -> Bytes {
    let mut buf = BytesMut::with_capacity(STUN_HEADER_SIZE);
    buf.put_u16(BINDING_REQUEST);
    buf.put_u16(0); // length, no attributes
    buf.put_u32(STUN_MAGIC_COOKIE);
    buf.put_slice(txid);
    buf.freeze()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingResponse {
    pub txid: TransactionId,
    pub mapped_address: SocketAddr,
}

/// Decode a STUN message, returning `Ok(Some(_))` for a successful Binding
/// Response, `Ok(None)` for anything else STUN-shaped (error response,
/// other method) and `Err` only for a truncated/corrupt header.
pub fn decode_binding_response(datagram: &[u8]) -> Result<Option<BindingResponse>> {
    if datagram.len() < STUN_HEADER_SIZE {
        return Err(Error::Stun("datagram shorter than STUN header".into()));
    }
    let msg_type = u16::from_be_bytes([datagram[0], datagram[1]]);
    let length = u16::from_be_bytes([datagram[2], datagram[3]]) as usize;
    let mut txid = [0u8; 12];
    txid.copy_from_slice(&datagram[8..20]);

    if msg_type == BINDING_ERROR_RESPONSE {
        return Ok(None);
    }
    if msg_type != BINDING_RESPONSE {
        return Ok(None);
    }

    let mut body = &datagram[STUN_HEADER_SIZE..(STUN_HEADER_SIZE + length).min(datagram.len())];
    while body.len() >= 4 {
        let attr_type = body.get_u16();
        let attr_len = body.get_u16() as usize;
        if body.len() < attr_len {
            break;
        }
        let value = &body[..attr_len];
        if attr_type == XOR_MAPPED_ADDRESS {
            if let Some(addr) = decode_xor_mapped_address(value, &txid) {
                return Ok(Some(BindingResponse { txid, mapped_address: addr }));
            }
        } else if attr_type == MAPPED_ADDRESS {
            if let Some(addr) = decode_mapped_address(value) {
                return Ok(Some(BindingResponse { txid, mapped_address: addr }));
            }
        }
        let padded = (attr_len + 3) & !3;
        body.advance(padded.min(body.len()));
    }
    Ok(None)
}

fn decode_mapped_address(mut value: &[u8]) -> Option<SocketAddr> {
    if value.len() < 8 {
        return None;
    }
    value.advance(1);
    let family = value.get_u8();
    let port = value.get_u16();
    if family != 1 {
        return None;
    }
    let ip = Ipv4Addr::new(value[0], value[1], value[2], value[3]);
    Some(SocketAddr::new(IpAddr::V4(ip), port))
}

fn decode_xor_mapped_address(mut value: &[u8], txid: &TransactionId) -> Option<SocketAddr> {
    if value.len() < 8 {
        return None;
    }
    value.advance(1);
    let family = value.get_u8();
    let xport = value.get_u16();
    let port = xport ^ (STUN_MAGIC_COOKIE >> 16) as u16;
    if family != 1 {
        return None;
    }
    let xip = value.get_u32();
    let ip = xip ^ STUN_MAGIC_COOKIE;
    let _ = txid; // IPv4 XOR only needs the magic cookie, not the transaction id.
    Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip)), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_binding_request_and_response() {
        let txid = new_transaction_id();
        let req = encode_binding_request(&txid);
        assert!(looks_like_stun(&req));

        let mapped: SocketAddr = "203.0.113.9:4500".parse().unwrap();
        let mut resp = BytesMut::new();
        resp.put_u16(BINDING_RESPONSE);
        let mut attr = BytesMut::new();
        attr.put_u8(0);
        attr.put_u8(1);
        attr.put_u16(mapped.port() ^ (STUN_MAGIC_COOKIE >> 16) as u16);
        let ip: u32 = match mapped.ip() {
            IpAddr::V4(v4) => u32::from_be_bytes(v4.octets()),
            _ => unreachable!(),
        };
        attr.put_u32(ip ^ STUN_MAGIC_COOKIE);
        resp.put_u16(attr.len() as u16 + 4);
        resp.put_u32(STUN_MAGIC_COOKIE);
        resp.put_slice(&txid);
        resp.put_u16(XOR_MAPPED_ADDRESS);
        resp.put_u16(attr.len() as u16);
        resp.put_slice(&attr);

        let decoded = decode_binding_response(&resp).unwrap().unwrap();
        assert_eq!(decoded.txid, txid);
        assert_eq!(decoded.mapped_address, mapped);
    }

    #[test]
    fn non_stun_datagram_is_not_misdetected() {
        let sip = b"OPTIONS sip:bob@biloxi.example SIP/2.0\r\n\r\n";
        assert!(!looks_like_stun(sip));
    }
}

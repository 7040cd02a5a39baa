//! Line-oriented SDP parser (RFC 8866): collects `m=` lines, resolves
//! `a=rtpmap`/`a=fmtp` onto their payload types, and picks up the T.38
//! attribute set (spec §4.2). Only the subset of SDP this engine acts on
//! is modeled; unrecognized lines are skipped rather than rejected, since
//! a peer's SDP routinely carries attributes (`a=ssrc`, `a=rtcp-mux`, ...)
//! this core has no opinion about.

use super::{Codec, MediaDescription, MediaDirection, MediaKind, RateManagement, SdpSession, T38Descriptor, UdpEc};

pub fn parse_session(body: &[u8]) -> Result<SdpSession, super::SdpError> {
    let text = String::from_utf8_lossy(body);
    let mut session_addr = None;
    let mut media: Vec<MediaDescription> = Vec::new();
    let mut bandwidth = None;

    for line in text.lines() {
        let line = line.trim_end();
        if let Some(v) = line.strip_prefix("c=") {
            let addr = parse_connection_addr(v);
            match media.last_mut() {
                Some(m) => m.connection_addr = addr,
                None => session_addr = addr,
            }
        } else if let Some(v) = line.strip_prefix("b=") {
            if let Some((kind, val)) = v.split_once(':') {
                if let Ok(n) = val.trim().parse::<u64>() {
                    bandwidth = Some((kind.to_string(), n));
                }
            }
        } else if let Some(v) = line.strip_prefix("m=") {
            if let Some(desc) = parse_media_line(v) {
                media.push(desc);
            }
        } else if let Some(v) = line.strip_prefix("a=") {
            if let Some(last) = media.last_mut() {
                apply_attribute(last, v);
            }
        }
    }

    Ok(SdpSession { session_connection_addr: session_addr, media, bandwidth })
}

fn parse_connection_addr(v: &str) -> Option<String> {
    // "IN IP4 <addr>" or "IN IP6 <addr>"
    let mut parts = v.split_whitespace();
    let _net = parts.next()?;
    let _kind = parts.next()?;
    parts.next().map(str::to_string)
}

fn parse_media_line(v: &str) -> Option<MediaDescription> {
    let mut parts = v.split_whitespace();
    let kind_tok = parts.next()?;
    let kind = match kind_tok {
        "audio" => MediaKind::Audio,
        "video" => MediaKind::Video,
        "image" => MediaKind::Image,
        _ => return None,
    };
    let port: u16 = parts.next()?.parse().ok()?;
    let proto = parts.next()?.to_string();
    let codecs = parts
        .filter_map(|pt| pt.parse::<u8>().ok())
        .filter_map(super::static_codec)
        .collect();
    Some(MediaDescription {
        media: kind,
        port,
        proto,
        codecs,
        direction: MediaDirection::SendRecv,
        connection_addr: None,
        ptime: None,
        t38: None,
    })
}

fn apply_attribute(desc: &mut MediaDescription, v: &str) {
    match v {
        "sendrecv" => desc.direction = MediaDirection::SendRecv,
        "sendonly" => desc.direction = MediaDirection::SendOnly,
        "recvonly" => desc.direction = MediaDirection::RecvOnly,
        "inactive" => desc.direction = MediaDirection::Inactive,
        _ => {}
    }
    if let Some(rest) = v.strip_prefix("rtpmap:") {
        apply_rtpmap(desc, rest);
    } else if let Some(rest) = v.strip_prefix("ptime:") {
        desc.ptime = rest.trim().parse().ok();
    } else if let Some(rest) = v.strip_prefix("T38FaxVersion:") {
        t38_mut(desc).version = rest.trim().parse().unwrap_or(0);
    } else if let Some(rest) = v.strip_prefix("T38MaxBitRate:") {
        t38_mut(desc).max_bitrate = rest.trim().parse().unwrap_or(0);
    } else if let Some(rest) = v.strip_prefix("T38FaxMaxDatagram:") {
        let n: u32 = rest.trim().parse().unwrap_or(0);
        let t = t38_mut(desc);
        t.max_datagram = n;
    } else if let Some(rest) = v.strip_prefix("T38FaxUdpEC:") {
        t38_mut(desc).udp_ec = match rest.trim() {
            "t38UDPRedundancy" => UdpEc::Redundancy,
            "t38UDPFEC" => UdpEc::Fec,
            _ => UdpEc::None,
        };
    } else if v.trim() == "T38FaxFillBitRemoval" {
        t38_mut(desc).fill_bit_removal = true;
    } else if v.trim() == "T38FaxTranscodingMMR" {
        t38_mut(desc).mmr = true;
    } else if v.trim() == "T38FaxTranscodingJBIG" {
        t38_mut(desc).jbig = true;
    } else if let Some(rest) = v.strip_prefix("T38FaxRateManagement:") {
        t38_mut(desc).rate_management = match rest.trim() {
            "localTCF" => RateManagement::LocalTcf,
            _ => RateManagement::TransferredTcf,
        };
    }
}

fn t38_mut(desc: &mut MediaDescription) -> &mut T38Descriptor {
    desc.t38.get_or_insert(T38Descriptor {
        version: 0,
        max_bitrate: 14400,
        max_datagram: 72,
        udp_ec: UdpEc::None,
        fill_bit_removal: false,
        mmr: false,
        jbig: false,
        rate_management: RateManagement::TransferredTcf,
    })
}

fn apply_rtpmap(desc: &mut MediaDescription, rest: &str) {
    let Some((pt_str, spec)) = rest.split_once(' ') else { return };
    let Ok(pt) = pt_str.trim().parse::<u8>() else { return };
    let mut it = spec.splitn(2, '/');
    let Some(name) = it.next() else { return };
    let clock_rate: u32 = it.next().and_then(|s| s.split('/').next()).and_then(|s| s.parse().ok()).unwrap_or(8000);
    let codec = Codec { payload_type: pt, name: name.to_string(), clock_rate };
    if let Some(existing) = desc.codecs.iter_mut().find(|c| c.payload_type == pt) {
        *existing = codec;
    } else {
        desc.codecs.push(codec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_audio_offer() {
        let sdp = b"v=0\r\no=- 1 1 IN IP4 192.0.2.1\r\ns=-\r\nc=IN IP4 192.0.2.1\r\nt=0 0\r\nm=audio 49170 RTP/AVP 0 8 101\r\na=rtpmap:101 telephone-event/8000\r\n";
        let session = parse_session(sdp).unwrap();
        assert_eq!(session.session_connection_addr.as_deref(), Some("192.0.2.1"));
        let m = &session.media[0];
        assert_eq!(m.media, MediaKind::Audio);
        assert_eq!(m.port, 49170);
        assert_eq!(m.codecs.len(), 3);
        assert!(m.codecs.iter().any(|c| c.name == "PCMU"));
    }

    #[test]
    fn parses_t38_image_line() {
        let sdp = b"v=0\r\no=- 1 1 IN IP4 192.0.2.1\r\ns=-\r\nc=IN IP4 192.0.2.1\r\nt=0 0\r\nm=image 4000 udptl t38\r\na=T38FaxVersion:0\r\na=T38MaxBitRate:14400\r\na=T38FaxUdpEC:t38UDPRedundancy\r\n";
        let session = parse_session(sdp).unwrap();
        let m = &session.media[0];
        assert_eq!(m.media, MediaKind::Image);
        let t38 = m.t38.as_ref().unwrap();
        assert_eq!(t38.max_bitrate, 14400);
        assert_eq!(t38.udp_ec, UdpEc::Redundancy);
    }

    #[test]
    fn detects_sendonly_direction() {
        let sdp = b"v=0\r\no=- 1 1 IN IP4 192.0.2.1\r\ns=-\r\nt=0 0\r\nm=audio 49170 RTP/AVP 0\r\na=sendonly\r\n";
        let session = parse_session(sdp).unwrap();
        assert_eq!(session.media[0].direction, MediaDirection::SendOnly);
    }
}

//! [`SdpSession`]/[`MediaPlan`] -> SDP body bytes, for building our offer
//! or answer after negotiation (spec §4.2).

use super::{MediaPlan, RateManagement, T38Descriptor, UdpEc};

/// Build an SDP body describing `plan`, bound to `local_addr`/`audio_port`
/// (and `video_port`/`t38_port` when those legs are present). `origin_id`
/// is the `o=` line's session id (caller owns monotonicity across
/// re-INVITEs).
pub fn serialize_session(
    plan: &MediaPlan,
    local_addr: &str,
    audio_port: u16,
    video_port: Option<u16>,
    t38_port: Option<u16>,
    origin_id: u64,
) -> String {
    let mut out = String::new();
    out.push_str("v=0\r\n");
    out.push_str(&format!("o=- {origin_id} {origin_id} IN IP4 {local_addr}\r\n"));
    out.push_str("s=-\r\n");
    out.push_str(&format!("c=IN IP4 {local_addr}\r\n"));
    out.push_str("t=0 0\r\n");

    if !plan.audio_codecs.is_empty() {
        let pts = plan.audio_codecs.iter().map(|c| c.payload_type.to_string()).collect::<Vec<_>>().join(" ");
        out.push_str(&format!("m=audio {audio_port} RTP/AVP {pts}\r\n"));
        out.push_str(&format!("c=IN IP4 {local_addr}\r\n"));
        for codec in &plan.audio_codecs {
            out.push_str(&codec.rtpmap_line());
            out.push_str("\r\n");
        }
        if plan.on_hold {
            out.push_str("a=sendonly\r\n");
        } else {
            out.push_str("a=sendrecv\r\n");
        }
    }

    if !plan.video_codecs.is_empty() {
        let port = video_port.unwrap_or(0);
        let pts = plan.video_codecs.iter().map(|c| c.payload_type.to_string()).collect::<Vec<_>>().join(" ");
        out.push_str(&format!("m=video {port} RTP/AVP {pts}\r\n"));
        for codec in &plan.video_codecs {
            out.push_str(&codec.rtpmap_line());
            out.push_str("\r\n");
        }
    }

    if let Some(t38) = &plan.t38 {
        let port = t38_port.unwrap_or(0);
        out.push_str(&format!("m=image {port} udptl t38\r\n"));
        out.push_str(&t38_attributes(t38));
    }

    out
}

fn t38_attributes(t38: &T38Descriptor) -> String {
    let mut out = String::new();
    out.push_str(&format!("a=T38FaxVersion:{}\r\n", t38.version));
    out.push_str(&format!("a=T38MaxBitRate:{}\r\n", t38.max_bitrate));
    out.push_str(&format!("a=T38FaxMaxDatagram:{}\r\n", t38.max_datagram));
    out.push_str(&format!(
        "a=T38FaxUdpEC:{}\r\n",
        match t38.udp_ec {
            UdpEc::Redundancy => "t38UDPRedundancy",
            UdpEc::Fec => "t38UDPFEC",
            UdpEc::None => "t38UDPNoEC",
        }
    ));
    if t38.fill_bit_removal {
        out.push_str("a=T38FaxFillBitRemoval\r\n");
    }
    if t38.mmr {
        out.push_str("a=T38FaxTranscodingMMR\r\n");
    }
    if t38.jbig {
        out.push_str("a=T38FaxTranscodingJBIG\r\n");
    }
    out.push_str(&format!(
        "a=T38FaxRateManagement:{}\r\n",
        match t38.rate_management {
            RateManagement::TransferredTcf => "transferredTCF",
            RateManagement::LocalTcf => "localTCF",
        }
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdp::{Codec, MediaPlanState};

    #[test]
    fn serializes_audio_only_plan() {
        let plan = MediaPlan {
            state: MediaPlanState::Negotiated,
            audio_codecs: vec![Codec { payload_type: 0, name: "PCMU".into(), clock_rate: 8000 }],
            video_codecs: vec![],
            t38: None,
            on_hold: false,
        };
        let body = serialize_session(&plan, "192.0.2.4", 49170, None, None, 1);
        assert!(body.contains("m=audio 49170 RTP/AVP 0"));
        assert!(body.contains("a=rtpmap:0 PCMU/8000"));
        assert!(body.contains("a=sendrecv"));
    }
}

//! REFER/transfer handling (spec §4.5 "Transfers"), grounded in the
//! teacher's `dialog-core::routing::dialog_matcher` dialog lookup by
//! Call-ID + tags.

use sipswitch_sip_core::prelude::Uri;

use super::dialog::DialogId;
use super::error::{DlgError, Result};

/// Parsed `Refer-To` target, with the optional `Replaces=` identifying an
/// attended-transfer target dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferTarget {
    pub uri: Uri,
    pub replaces: Option<DialogId>,
}

/// Outcome of processing a REFER (spec §4.5: "Always emit a `202
/// Accepted` immediately and a subsequent NOTIFY `message/sipfrag`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferKind {
    /// `Replaces=` named a dialog we could locate: bridge the referring
    /// dialog's peer into that dialog's peer, then BYE the REFER dialog.
    Attended { target_dialog: DialogId },
    /// No `Replaces=`: route the bridged peer to the new destination.
    Blind { destination: Uri },
}

/// Parse the `Refer-To` header value, extracting an embedded `Replaces`
/// parameter if present (it travels as a `?Replaces=...` URI header on
/// the Refer-To URI per RFC 3891).
pub fn parse_refer_to(raw: &str) -> Result<ReferTarget> {
    let uri = Uri::parse(raw).map_err(|_| DlgError::InvalidTransfer)?;
    let replaces = uri.headers.get("Replaces").and_then(|v| parse_replaces(v));
    Ok(ReferTarget { uri, replaces })
}

/// `Replaces` value format: `call-id;from-tag=...;to-tag=...` (percent
/// decoded minimally: `%3B` -> `;`, `%3D` -> `=`).
fn parse_replaces(raw: &str) -> Option<DialogId> {
    let decoded = raw
        .replace("%3B", ";")
        .replace("%3b", ";")
        .replace("%3D", "=")
        .replace("%3d", "=")
        .replace("%40", "@");
    let mut parts = decoded.split(';');
    let call_id = parts.next()?.to_string();
    let mut from_tag = None;
    let mut to_tag = None;
    for part in parts {
        if let Some(v) = part.strip_prefix("from-tag=") {
            from_tag = Some(v.to_string());
        } else if let Some(v) = part.strip_prefix("to-tag=") {
            to_tag = Some(v.to_string());
        }
    }
    Some(DialogId { call_id, local_tag: to_tag?, remote_tag: from_tag? })
}

/// Classify a REFER given the parsed `Refer-To` and whether the named
/// dialog (if any) could be located locally (spec §4.5).
pub fn classify_transfer(refer_to: &ReferTarget, target_dialog_exists: impl Fn(&DialogId) -> bool) -> TransferKind {
    match &refer_to.replaces {
        Some(dialog_id) if target_dialog_exists(dialog_id) => TransferKind::Attended { target_dialog: dialog_id.clone() },
        _ => TransferKind::Blind { destination: refer_to.uri.clone() },
    }
}

/// Build the `message/sipfrag` body for the progress NOTIFY (spec §4.5 /
/// §8 S6: `"SIP/2.0 200 OK"`).
pub fn sipfrag_body(status_line: &str) -> String {
    format!("SIP/2.0 {status_line}\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blind_transfer_has_no_replaces() {
        let target = parse_refer_to("<sip:charlie@example.com>").unwrap();
        assert!(target.replaces.is_none());
        let kind = classify_transfer(&target, |_| true);
        assert_eq!(kind, TransferKind::Blind { destination: Uri::parse("sip:charlie@example.com").unwrap() });
    }

    #[test]
    fn attended_transfer_parses_replaces_and_locates_dialog() {
        let target = parse_refer_to(
            "sip:charlie@example.com?Replaces=12345%40atlanta.example%3Bfrom-tag%3D1234567%3Bto-tag%3D314159",
        )
        .unwrap();
        let replaces = target.replaces.clone().unwrap();
        assert_eq!(replaces.call_id, "12345@atlanta.example");
        assert_eq!(replaces.remote_tag, "1234567");
        assert_eq!(replaces.local_tag, "314159");
        let kind = classify_transfer(&target, |_| true);
        assert_eq!(kind, TransferKind::Attended { target_dialog: replaces });
    }

    #[test]
    fn sipfrag_wraps_status_line() {
        assert_eq!(sipfrag_body("200 OK"), "SIP/2.0 200 OK\r\n");
    }
}

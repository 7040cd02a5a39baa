//! Method-capability table, `Allow`/`Supported` header construction, and
//! the 420/501/481/603 status mappings (spec §4.5/§6/§7), grounded in the
//! teacher's `dialog-core::routing::request_router` dispatch table.

use sipswitch_sip_core::prelude::Method;

/// Whether `method` creates a new dialog when it matches none of the
/// existing ones, and whether it carries RTP (spec §4.5 method-capability
/// table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogCreation {
    Always,
    /// NOTIFY: only if no dialog exists *and* an established subscription
    /// does; otherwise 481.
    IfSubscriptionEstablished,
    /// REFER: only within a dialog; otherwise 603.
    WithinDialogOnly,
    Never,
}

pub fn dialog_creation(method: Method) -> DialogCreation {
    use DialogCreation::*;
    match method {
        Method::Invite | Method::Register | Method::Subscribe | Method::Options | Method::Message => Always,
        Method::Notify => IfSubscriptionEstablished,
        Method::Refer => WithinDialogOnly,
        Method::Ack | Method::Cancel => Never,
        _ => Never,
    }
}

pub fn needs_rtp(method: Method) -> bool {
    matches!(method, Method::Invite)
}

/// `Allow:` value (spec §6: "INVITE, ACK, CANCEL, OPTIONS, BYE, REFER,
/// SUBSCRIBE, NOTIFY").
pub fn allow_header_value() -> String {
    Method::ALLOWED.iter().map(Method::as_str).collect::<Vec<_>>().join(", ")
}

/// Every extension tag this engine recognizes (spec §6: only `replaces`).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["replaces"];

pub fn supported_header_value() -> String {
    SUPPORTED_EXTENSIONS.join(", ")
}

/// A `Required:` header naming any tag outside [`SUPPORTED_EXTENSIONS`]
/// yields `420 Bad Extension` with the offending tags in `Unsupported:`
/// (spec §6).
pub fn unsupported_required_tags<'a>(required: impl Iterator<Item = &'a str>) -> Vec<String> {
    required
        .filter(|tag| !SUPPORTED_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(tag)))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_only_creates_dialog_conditionally() {
        assert_eq!(dialog_creation(Method::Notify), DialogCreation::IfSubscriptionEstablished);
        assert_eq!(dialog_creation(Method::Refer), DialogCreation::WithinDialogOnly);
        assert_eq!(dialog_creation(Method::Ack), DialogCreation::Never);
    }

    #[test]
    fn allow_header_lists_spec_methods_in_order() {
        assert_eq!(allow_header_value(), "INVITE, ACK, CANCEL, OPTIONS, BYE, REFER, SUBSCRIBE, NOTIFY");
    }

    #[test]
    fn unknown_required_extension_is_flagged() {
        let tags = unsupported_required_tags(["replaces", "100rel"].into_iter());
        assert_eq!(tags, vec!["100rel".to_string()]);
    }
}

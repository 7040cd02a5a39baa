use sipswitch_sip_core::prelude::Method;

/// Transaction kind (spec §3 "Transaction").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    InviteClient,
    InviteServer,
    NonInviteClient,
    NonInviteServer,
}

impl TransactionKind {
    pub fn is_invite(self) -> bool {
        matches!(self, TransactionKind::InviteClient | TransactionKind::InviteServer)
    }

    pub fn is_client(self) -> bool {
        matches!(self, TransactionKind::InviteClient | TransactionKind::NonInviteClient)
    }
}

/// Keyed by `(branch, method)` for server transactions and by `(Call-ID,
/// CSeq, method, branch)` for client (spec §3). We carry both identities
/// in one key since a transaction only ever matches one side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub branch: String,
    pub method: Method,
    pub call_id: Option<String>,
    pub cseq: Option<u32>,
}

impl TransactionKey {
    /// Server-side key: `(branch, method)`. CANCEL matches the INVITE
    /// transaction's branch but its own method, so server lookups key on
    /// the literal method carried by the request.
    pub fn server(branch: impl Into<String>, method: Method) -> Self {
        TransactionKey { branch: branch.into(), method, call_id: None, cseq: None }
    }

    /// Client-side key: `(Call-ID, CSeq, method, branch)`.
    pub fn client(branch: impl Into<String>, method: Method, call_id: impl Into<String>, cseq: u32) -> Self {
        TransactionKey { branch: branch.into(), method, call_id: Some(call_id.into()), cseq: Some(cseq) }
    }
}

/// A fresh RFC 3261 branch token: `z9hG4bK<8-hex>` (spec §6).
pub fn new_branch() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    format!("z9hG4bK{:08x}", rng.gen::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_has_magic_cookie_prefix() {
        let b = new_branch();
        assert!(b.starts_with("z9hG4bK"));
        assert_eq!(b.len(), "z9hG4bK".len() + 8);
    }
}

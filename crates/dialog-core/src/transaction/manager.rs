//! Transaction table (spec §5 "the dialog-map"): a concurrent map keyed by
//! [`TransactionKey`], matching incoming messages to existing transactions
//! and creating new ones, grounded in the teacher's
//! `transaction-core::manager` dashmap-backed table.

use dashmap::DashMap;

use super::client::{InviteClientTransaction, NonInviteClientTransaction};
use super::error::{Result, TxError};
use super::key::TransactionKey;
use super::server::{InviteServerTransaction, NonInviteServerTransaction};

pub enum Transaction {
    InviteClient(InviteClientTransaction),
    InviteServer(InviteServerTransaction),
    NonInviteClient(NonInviteClientTransaction),
    NonInviteServer(NonInviteServerTransaction),
}

/// Owns no dialog reference (spec §3 "Ownership": "The transaction layer
/// owns no dialog reference; it delivers completions to the dialog by
/// identifier").
#[derive(Default)]
pub struct TransactionManager {
    transactions: DashMap<TransactionKey, Transaction>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: TransactionKey, tx: Transaction) -> Result<()> {
        if self.transactions.contains_key(&key) {
            return Err(TxError::Duplicate);
        }
        self.transactions.insert(key, tx);
        Ok(())
    }

    pub fn remove(&self, key: &TransactionKey) -> Option<Transaction> {
        self.transactions.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &TransactionKey) -> bool {
        self.transactions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn with_mut<R>(&self, key: &TransactionKey, f: impl FnOnce(&mut Transaction) -> R) -> Option<R> {
        self.transactions.get_mut(key).map(|mut entry| f(entry.value_mut()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipswitch_sip_core::prelude::Method;

    #[test]
    fn rejects_duplicate_transaction_key() {
        let mgr = TransactionManager::new();
        let key = TransactionKey::server("z9hG4bK1", Method::Invite);
        mgr.insert(key.clone(), Transaction::InviteServer(InviteServerTransaction::new())).unwrap();
        assert_eq!(mgr.insert(key, Transaction::InviteServer(InviteServerTransaction::new())), Err(TxError::Duplicate));
    }

    #[test]
    fn with_mut_drives_state_transition() {
        let mgr = TransactionManager::new();
        let key = TransactionKey::server("z9hG4bK2", Method::Invite);
        mgr.insert(key.clone(), Transaction::InviteServer(InviteServerTransaction::new())).unwrap();
        mgr.with_mut(&key, |tx| {
            if let Transaction::InviteServer(s) = tx {
                s.on_response_sent(180);
            }
        });
        mgr.with_mut(&key, |tx| {
            if let Transaction::InviteServer(s) = tx {
                assert_eq!(s.state, super::super::server::InviteServerState::Proceeding);
            }
        });
    }
}

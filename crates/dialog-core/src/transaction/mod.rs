//! Client/server INVITE and non-INVITE transaction state machines (spec
//! §4.4), Timer A/B/E/F/T1/T2 arithmetic (spec §4.8), and the transaction
//! table that matches incoming messages to a transaction or creates one.

pub mod client;
pub mod error;
pub mod key;
pub mod manager;
pub mod server;
pub mod timer;

pub use client::{ClientAction, InviteClientState, InviteClientTransaction, NonInviteClientState, NonInviteClientTransaction};
pub use error::{Result, TxError};
pub use key::{new_branch, TransactionKey, TransactionKind};
pub use manager::{Transaction, TransactionManager};
pub use server::{InviteServerState, InviteServerTransaction, NonInviteServerState, NonInviteServerTransaction, ServerAction};
pub use timer::{T1, T2, TIMER_B, TIMER_F};

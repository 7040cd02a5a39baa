//! SIP digest authentication (RFC 2617/3261, spec §4.6): challenge
//! generation, credential verification, nonce-count replay protection,
//! and the retry cap. No account storage lives here -- see
//! [`credential::CredentialStore`] for the host seam.

pub mod credential;
pub mod digest;
pub mod error;
pub mod nonce;
pub mod verifier;

pub use credential::{Credential, CredentialStore, StaticCredentialStore};
pub use digest::Challenge;
pub use error::{Error, Result};
pub use verifier::{AttemptTracker, AuthVerifier, MAX_AUTH_ATTEMPTS};

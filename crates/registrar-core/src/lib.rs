//! Registration (spec §4.7): inbound registrar logic (auth gate, binding
//! table, persistence seam) and outbound UAC registration state machines.

pub mod binding;
pub mod error;
pub mod registrar;
pub mod uac;

pub use binding::{AorBindings, Binding, BindingStore, InMemoryBindingStore, LocationService, PersistedBinding};
pub use error::{Error, Result};
pub use registrar::{handle_register, parse_contacts, requires_auth, ContactEntry, RegisterOutcome, RegistrarConfig};
pub use uac::{process_response, refresh_delay, resolve_expires, RegistrationEntry, RegistrationState, UacOutcome};

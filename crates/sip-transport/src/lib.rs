//! Single UDP socket transport, STUN interleaving, and NAT rewrite rules
//! for the sipswitch stack (spec §4.3/§4.9). This crate owns only the
//! socket and the STUN in-flight table (spec §3's ownership note) -- no
//! dialog or transaction state lives here.

pub mod error;
pub mod nat;
pub mod stun;
pub mod udp;

pub use error::{Error, Result};
pub use nat::NatMode;
pub use udp::{Transport, TransportEvent, UdpTransport};

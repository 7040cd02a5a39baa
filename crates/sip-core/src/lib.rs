//! # sipswitch-sip-core
//!
//! RFC 3261 message codec and SDP offer/answer negotiator.
//!
//! This crate owns exactly two responsibilities: turning UDP payload bytes
//! into structured [`Message`] values and back (the [`parser`] and
//! [`serializer`] modules), and negotiating an SDP offer/answer into a
//! [`sdp::MediaPlan`] (the [`sdp`] module). It has no notion of
//! transactions, dialogs, or sockets -- those live in
//! `sipswitch-dialog-core` and `sipswitch-sip-transport`.
//!
//! ```
//! use sipswitch_sip_core::prelude::*;
//!
//! let raw = b"REGISTER sip:example.com SIP/2.0\r\n\
//! Via: SIP/2.0/UDP pc33.example.com;branch=z9hG4bK776asdhds\r\n\
//! Max-Forwards: 70\r\n\
//! To: Bob <sip:bob@example.com>\r\n\
//! From: Bob <sip:bob@example.com>;tag=456248\r\n\
//! Call-ID: 843817637684230@998sdasdh09\r\n\
//! CSeq: 1826 REGISTER\r\n\
//! Contact: <sip:bob@192.0.2.4>\r\n\
//! Content-Length: 0\r\n\r\n";
//! let msg = parse_message(raw, ParserMode::Strict).unwrap();
//! assert!(matches!(msg, Message::Request(req) if req.method == Method::Register));
//! ```

pub mod error;
pub mod method;
pub mod status;
pub mod uri;
pub mod headers;
pub mod message;
pub mod parser;
pub mod serializer;

#[cfg(feature = "sdp")]
pub mod sdp;

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::headers::{Header, HeaderName, Headers};
    pub use crate::message::{Message, MalformedReject, Request, Response};
    pub use crate::method::Method;
    pub use crate::parser::{parse_message, ParserMode};
    pub use crate::serializer::serialize;
    pub use crate::status::StatusCode;
    pub use crate::uri::Uri;
    #[cfg(feature = "sdp")]
    pub use crate::sdp::*;
}

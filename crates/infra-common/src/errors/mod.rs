//! Error context utilities shared across subsystem-specific error enums.
//!
//! Each crate in the workspace defines its own `thiserror` enum (`ParseError`,
//! `TxError`, `DlgError`, ...) rather than funnelling everything through one
//! giant error type. What's shared is the ability to attach a
//! component/operation breadcrumb when an error crosses a layer boundary,
//! which is what this module provides.

mod context;

pub use context::{ErrorContext, ErrorExt};

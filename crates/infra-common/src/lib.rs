//! Shared infrastructure for the sipswitch workspace: error context helpers,
//! `tracing` setup, a flat key-value configuration loader, and the scheduler
//! that every timer-driven subsystem (transaction retransmission,
//! registration refresh, keepalive poke) is built on top of.
//!
//! Nothing in here knows about SIP. It exists so the protocol crates don't
//! each reinvent logging setup or a timer heap.

pub mod config;
pub mod errors;
pub mod logging;
pub mod scheduler;

pub use errors::{ErrorContext, ErrorExt};
pub use scheduler::{Scheduler, TimerId};

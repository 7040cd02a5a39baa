//! `tracing` setup shared by every binary/test in the workspace.

mod setup;

pub use setup::init;

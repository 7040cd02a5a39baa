use tracing_subscriber::{fmt, EnvFilter};

/// Install a `tracing` subscriber driven by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops if a global
/// subscriber is already installed.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

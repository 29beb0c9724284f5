//! Log output

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a formatting subscriber filtered by `RUST_LOG`
///
/// Does nothing if a subscriber is already installed.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

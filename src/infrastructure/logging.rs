//! Logging initialization.
//!
//! Console logging with `RUST_LOG`-style filtering. Initialization is
//! idempotent so library consumers and tests can call it freely.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Initialize the tracing subscriber once for the whole process.
///
/// Repeated calls are no-ops; a subscriber installed by the host (e.g. a
/// test harness) is left in place.
pub fn init_logging() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}

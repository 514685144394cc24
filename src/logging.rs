//! Logging setup for the `shelf` binary.
//!
//! The library logs through the `log` facade; the subscriber installed here
//! picks those records up and writes them to stderr, keeping stdout free for
//! command output and the control protocol.
//!
//! ```bash
//! SHELF_LOG=debug shelf save
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_ENV: &str = "SHELF_LOG";

const DEFAULT_FILTER: &str = "shelf_lib=info,shelf=info,warn";

/// Build the filter from `SHELF_LOG`, falling back to the default.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Safe to call once per process; later calls
/// are ignored.
pub fn init() {
    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_timer(fmt::time::ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string())),
        )
        .try_init()
        .is_ok();

    if installed {
        log::debug!("Logging initialized");
    }
}

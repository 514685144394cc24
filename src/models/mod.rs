pub mod app;
pub mod settings;
pub mod snapshot;

pub use app::{AppIdentity, RunningApp};
pub use settings::{Settings, TimerOption};
pub use snapshot::SessionSnapshot;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, or 0 if the clock is set before it.
pub(crate) fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

use crate::models::{AppIdentity, RunningApp};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0} is not running")]
    NotRunning(String),

    #[error("{0} refused the request")]
    Refused(String),

    #[error("Not supported on this platform")]
    Unsupported,

    #[error("{command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Display server error: {0}")]
    Display(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// OS boundary used by the session engine.
///
/// `open` must go through the platform's application launcher (LaunchServices,
/// XDG desktop entries) so the relaunched app behaves like a normal user launch.
pub trait ProcessActions: Send + Sync {
    fn list_running_applications(&self) -> Result<Vec<RunningApp>, PlatformError>;
    fn hide(&self, app: &RunningApp) -> Result<(), PlatformError>;
    fn terminate(&self, app: &RunningApp) -> Result<(), PlatformError>;
    fn open(&self, target: &AppIdentity) -> Result<(), PlatformError>;
}

pub mod types;

pub use types::{PlatformError, ProcessActions};

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "linux")]
pub mod desktop_entry;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "macos")]
pub use macos::MacOSActions as NativeActions;

#[cfg(target_os = "linux")]
pub use linux::LinuxActions as NativeActions;

#[cfg(any(target_os = "macos", target_os = "linux"))]
use std::ffi::OsStr;
#[cfg(any(target_os = "macos", target_os = "linux"))]
use std::process::Command;

/// Run a launcher program (`open`, `gtk-launch`, ...) and wait for it to hand off.
#[cfg(any(target_os = "macos", target_os = "linux"))]
pub(crate) fn launch_with(program: &str, args: &[&OsStr]) -> Result<(), PlatformError> {
    let output = Command::new(program).args(args).output()?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(PlatformError::Command {
        command: program.to_string(),
        reason: if stderr.is_empty() {
            output.status.to_string()
        } else {
            stderr
        },
    })
}

// Stub for development on other platforms
#[cfg(not(any(target_os = "macos", target_os = "linux")))]
#[derive(Default)]
pub struct NativeActions;

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
impl NativeActions {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
impl ProcessActions for NativeActions {
    fn list_running_applications(&self) -> Result<Vec<crate::models::RunningApp>, PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn hide(&self, _app: &crate::models::RunningApp) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn terminate(&self, _app: &crate::models::RunningApp) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn open(&self, _target: &crate::models::AppIdentity) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable, value-typed identity of an application.
///
/// Used both as the dedup/filter key and as the target handed to the OS
/// launcher. Never refers to the executable inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AppIdentity {
    BundleId(String),
    BundlePath(PathBuf),
}

impl fmt::Display for AppIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppIdentity::BundleId(id) => write!(f, "{id}"),
            AppIdentity::BundlePath(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A running user application as reported by the platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningApp {
    pub bundle_identifier: Option<String>,
    /// Path of the application bundle (`Foo.app`, or a `.desktop` entry on Linux).
    pub bundle_path: PathBuf,
    pub display_name: String,
    pub is_frontmost: bool,
    /// Executable inside the bundle. Informational only, never launched.
    #[serde(skip)]
    pub executable_path: Option<PathBuf>,
}

impl RunningApp {
    pub fn new(bundle_identifier: Option<&str>, bundle_path: impl Into<PathBuf>, display_name: &str) -> Self {
        Self {
            bundle_identifier: bundle_identifier
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            bundle_path: bundle_path.into(),
            display_name: display_name.to_string(),
            is_frontmost: false,
            executable_path: None,
        }
    }

    pub fn with_frontmost(mut self, is_frontmost: bool) -> Self {
        self.is_frontmost = is_frontmost;
        self
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    /// Bundle identifier when known, bundle path otherwise.
    pub fn identity(&self) -> AppIdentity {
        match &self.bundle_identifier {
            Some(id) => AppIdentity::BundleId(id.clone()),
            None => AppIdentity::BundlePath(self.bundle_path.clone()),
        }
    }

    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_prefers_bundle_identifier() {
        let app = RunningApp::new(Some("com.apple.Safari"), "/Applications/Safari.app", "Safari");
        assert_eq!(app.identity(), AppIdentity::BundleId("com.apple.Safari".to_string()));
    }

    #[test]
    fn test_identity_falls_back_to_bundle_path() {
        let app = RunningApp::new(None, "/Applications/Tool.app", "Tool");
        assert_eq!(
            app.identity(),
            AppIdentity::BundlePath(PathBuf::from("/Applications/Tool.app"))
        );
    }

    #[test]
    fn test_blank_identifier_treated_as_absent() {
        let app = RunningApp::new(Some("  "), "/Applications/Tool.app", "Tool");
        assert!(app.bundle_identifier.is_none());
    }

    #[test]
    fn test_executable_path_does_not_affect_identity() {
        let plain = RunningApp::new(None, "/Applications/Tool.app", "Tool");
        let with_exe = plain
            .clone()
            .with_executable("/Applications/Tool.app/Contents/MacOS/Tool");
        assert_eq!(plain.identity(), with_exe.identity());
    }

    #[test]
    fn test_identity_display() {
        let app = RunningApp::new(None, "/Applications/Tool.app", "Tool");
        assert_eq!(app.identity().to_string(), "/Applications/Tool.app");
    }
}

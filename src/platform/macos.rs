#![allow(unsafe_code, reason = "AppKit bindings are exposed as unsafe fns")]

use super::{launch_with, PlatformError, ProcessActions};
use crate::models::{AppIdentity, RunningApp};
use log::debug;
use objc2::rc::Id;
use objc2_app_kit::{NSApplicationActivationPolicy, NSRunningApplication, NSWorkspace};
use objc2_foundation::NSURL;
use std::ffi::OsStr;
use std::path::PathBuf;

#[derive(Default)]
pub struct MacOSActions;

impl MacOSActions {
    pub fn new() -> Self {
        Self
    }

    /// Running applications plus the frontmost application as reported
    /// separately by the workspace, when it is not already in the list.
    fn running_applications() -> Vec<Id<NSRunningApplication>> {
        let workspace = unsafe { NSWorkspace::sharedWorkspace() };
        let mut apps = unsafe { workspace.runningApplications() }.to_vec_retained();
        if let Some(frontmost) = unsafe { workspace.frontmostApplication() } {
            if !apps.iter().any(|app| std::ptr::eq(&**app, &*frontmost)) {
                apps.push(frontmost);
            }
        }
        apps
    }

    fn own_bundle_path() -> Option<PathBuf> {
        let current = unsafe { NSRunningApplication::currentApplication() };
        unsafe { current.bundleURL() }.as_deref().and_then(url_to_path)
    }

    fn describe(app: &NSRunningApplication) -> Option<RunningApp> {
        if unsafe { app.activationPolicy() } != NSApplicationActivationPolicy::Regular {
            return None;
        }

        let bundle_path = unsafe { app.bundleURL() }.as_deref().and_then(url_to_path)?;
        let bundle_identifier = unsafe { app.bundleIdentifier() }.map(|id| id.to_string());
        let display_name = unsafe { app.localizedName() }.map_or_else(
            || {
                bundle_path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default()
            },
            |name| name.to_string(),
        );

        let mut described = RunningApp::new(bundle_identifier.as_deref(), bundle_path, &display_name)
            .with_frontmost(unsafe { app.isActive() });
        if let Some(executable) = unsafe { app.executableURL() }.as_deref().and_then(url_to_path) {
            described = described.with_executable(executable);
        }
        Some(described)
    }

    /// Re-resolve live process handles for a descriptor through its identity.
    fn find_live(app: &RunningApp) -> Result<Vec<Id<NSRunningApplication>>, PlatformError> {
        let identity = app.identity();
        let matches: Vec<_> = Self::running_applications()
            .into_iter()
            .filter(|live| Self::describe(live).is_some_and(|d| d.identity() == identity))
            .collect();

        if matches.is_empty() {
            return Err(PlatformError::NotRunning(app.display_name.clone()));
        }
        Ok(matches)
    }
}

fn url_to_path(url: &NSURL) -> Option<PathBuf> {
    let absolute = unsafe { url.absoluteString() }?;
    url::Url::parse(&absolute.to_string()).ok()?.to_file_path().ok()
}

impl ProcessActions for MacOSActions {
    fn list_running_applications(&self) -> Result<Vec<RunningApp>, PlatformError> {
        let own_bundle = Self::own_bundle_path();
        let apps: Vec<RunningApp> = Self::running_applications()
            .iter()
            .filter_map(|app| Self::describe(app))
            .filter(|app| own_bundle.as_deref() != Some(app.bundle_path()))
            .collect();

        debug!("NSWorkspace reported {} regular applications", apps.len());
        Ok(apps)
    }

    fn hide(&self, app: &RunningApp) -> Result<(), PlatformError> {
        for live in Self::find_live(app)? {
            if !unsafe { live.hide() } {
                return Err(PlatformError::Refused(app.display_name.clone()));
            }
        }
        Ok(())
    }

    fn terminate(&self, app: &RunningApp) -> Result<(), PlatformError> {
        for live in Self::find_live(app)? {
            if !unsafe { live.terminate() } {
                return Err(PlatformError::Refused(app.display_name.clone()));
            }
        }
        Ok(())
    }

    /// Launch through LaunchServices via `open(1)`, by bundle id or bundle path.
    fn open(&self, target: &AppIdentity) -> Result<(), PlatformError> {
        match target {
            AppIdentity::BundleId(id) => launch_with("open", &[OsStr::new("-b"), OsStr::new(id)]),
            AppIdentity::BundlePath(path) => launch_with("open", &[path.as_os_str()]),
        }
    }
}

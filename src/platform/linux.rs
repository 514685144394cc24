use super::desktop_entry::{application_dirs, DesktopEntry, DesktopIndex};
use super::{launch_with, PlatformError, ProcessActions};
use crate::models::{AppIdentity, RunningApp};
use log::{debug, warn};
use std::ffi::OsStr;
use std::path::PathBuf;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ClientMessageEvent, ConnectionExt, EventMask, Window};
use x11rb::rust_connection::RustConnection;

/// ICCCM `IconicState`, sent with `WM_CHANGE_STATE` to minimize a window.
const ICONIC_STATE: u32 = 3;

/// EWMH source indication for requests coming from a pager-like tool.
const SOURCE_PAGER: u32 = 2;

pub struct LinuxActions {
    conn: Option<RustConnection>,
    root: Window,
    desktop_entries: DesktopIndex,
}

impl Default for LinuxActions {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxActions {
    pub fn new() -> Self {
        let desktop_entries = DesktopIndex::load(&application_dirs());

        match x11rb::connect(None) {
            Ok((conn, screen_num)) => {
                let Some(root) = conn.setup().roots.get(screen_num).map(|screen| screen.root) else {
                    warn!("Invalid screen number {screen_num}. Application control disabled.");
                    return Self { conn: None, root: 0, desktop_entries };
                };
                Self {
                    conn: Some(conn),
                    root,
                    desktop_entries,
                }
            }
            Err(e) => {
                // Keep running on Wayland or headless systems; enumeration reports the error.
                warn!("Failed to connect to X server: {e}. Application control disabled.");
                Self { conn: None, root: 0, desktop_entries }
            }
        }
    }

    fn conn(&self) -> Result<&RustConnection, PlatformError> {
        self.conn
            .as_ref()
            .ok_or_else(|| PlatformError::Display("no X server connection".to_string()))
    }

    fn get_atom(&self, name: &str) -> Result<u32, PlatformError> {
        let conn = self.conn()?;
        let reply = conn
            .intern_atom(false, name.as_bytes())
            .map_err(display_error)?
            .reply()
            .map_err(display_error)?;
        Ok(reply.atom)
    }

    fn get_u32_property(&self, window: Window, atom: u32, kind: AtomEnum) -> Vec<u32> {
        let Ok(conn) = self.conn() else {
            return Vec::new();
        };
        conn.get_property(false, window, atom, kind, 0, 1024)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .and_then(|reply| {
                let values: Option<Vec<u32>> = reply.value32().map(Iterator::collect);
                values
            })
            .unwrap_or_default()
    }

    fn get_wm_class(&self, window: Window) -> Option<(String, String)> {
        let reply = self
            .conn()
            .ok()?
            .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 1024)
            .ok()?
            .reply()
            .ok()?;

        let value = String::from_utf8(reply.value).ok()?;
        let mut parts = value.split('\0');
        let instance = parts.next()?.to_string();
        let class = parts.next().unwrap_or_default().to_string();
        Some((instance, class))
    }

    fn client_windows(&self) -> Result<Vec<Window>, PlatformError> {
        let atom = self.get_atom("_NET_CLIENT_LIST")?;
        Ok(self.get_u32_property(self.root, atom, AtomEnum::WINDOW))
    }

    fn active_window(&self) -> Option<Window> {
        let atom = self.get_atom("_NET_ACTIVE_WINDOW").ok()?;
        self.get_u32_property(self.root, atom, AtomEnum::WINDOW)
            .into_iter()
            .next()
            .filter(|window| *window != 0)
    }

    fn executable_for(&self, window: Window) -> Option<PathBuf> {
        let atom = self.get_atom("_NET_WM_PID").ok()?;
        let pid = self
            .get_u32_property(window, atom, AtomEnum::CARDINAL)
            .into_iter()
            .next()?;
        std::fs::read_link(format!("/proc/{pid}/exe")).ok()
    }

    fn entry_for(&self, window: Window) -> Option<&DesktopEntry> {
        let (instance, class) = self.get_wm_class(window)?;
        let entry = self.desktop_entries.lookup(&instance, &class);
        if entry.is_none() {
            debug!("No desktop entry for window class '{instance}'/'{class}', skipping");
        }
        entry
    }

    /// Every managed window that belongs to `app`.
    fn windows_for(&self, app: &RunningApp) -> Result<Vec<Window>, PlatformError> {
        let identity = app.identity();
        let windows: Vec<Window> = self
            .client_windows()?
            .into_iter()
            .filter(|window| {
                self.entry_for(*window)
                    .is_some_and(|entry| entry_identity_matches(entry, &identity))
            })
            .collect();

        if windows.is_empty() {
            return Err(PlatformError::NotRunning(app.display_name.clone()));
        }
        Ok(windows)
    }

    fn send_root_message(&self, window: Window, atom_name: &str, data: [u32; 5]) -> Result<(), PlatformError> {
        let conn = self.conn()?;
        let atom = self.get_atom(atom_name)?;
        let event = ClientMessageEvent::new(32, window, atom, data);
        conn.send_event(
            false,
            self.root,
            EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
            event,
        )
        .map_err(display_error)?;
        conn.flush().map_err(display_error)?;
        Ok(())
    }
}

fn entry_identity_matches(entry: &DesktopEntry, identity: &AppIdentity) -> bool {
    match identity {
        AppIdentity::BundleId(id) => entry.id == *id,
        AppIdentity::BundlePath(path) => entry.path == *path,
    }
}

fn display_error(e: impl std::fmt::Display) -> PlatformError {
    PlatformError::Display(e.to_string())
}

impl ProcessActions for LinuxActions {
    /// One descriptor per managed window that maps to a desktop entry, so an
    /// application with several windows is reported several times.
    fn list_running_applications(&self) -> Result<Vec<RunningApp>, PlatformError> {
        let active = self.active_window();
        let apps: Vec<RunningApp> = self
            .client_windows()?
            .into_iter()
            .filter_map(|window| {
                let entry = self.entry_for(window)?;
                let mut app = RunningApp::new(Some(&entry.id), entry.path.clone(), &entry.name)
                    .with_frontmost(Some(window) == active);
                if let Some(executable) = self.executable_for(window) {
                    app = app.with_executable(executable);
                }
                Some(app)
            })
            .collect();

        debug!("X11 reported {} application windows", apps.len());
        Ok(apps)
    }

    fn hide(&self, app: &RunningApp) -> Result<(), PlatformError> {
        for window in self.windows_for(app)? {
            self.send_root_message(window, "WM_CHANGE_STATE", [ICONIC_STATE, 0, 0, 0, 0])?;
        }
        Ok(())
    }

    fn terminate(&self, app: &RunningApp) -> Result<(), PlatformError> {
        for window in self.windows_for(app)? {
            self.send_root_message(window, "_NET_CLOSE_WINDOW", [0, SOURCE_PAGER, 0, 0, 0])?;
        }
        Ok(())
    }

    /// Launch through the desktop entry, never the binary behind it.
    fn open(&self, target: &AppIdentity) -> Result<(), PlatformError> {
        match target {
            AppIdentity::BundleId(id) => launch_with("gtk-launch", &[OsStr::new(id)]),
            AppIdentity::BundlePath(path) => {
                launch_with("gio", &[OsStr::new("launch"), path.as_os_str()])
            }
        }
    }
}

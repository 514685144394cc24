//! Single entry point for the presentation layer and hotkeys.
//!
//! Composes the settings store, the session service and the reopen timer.
//! Every intent reads one settings snapshot at its start.

pub mod view;

pub use view::SessionView;

use crate::db::Database;
use crate::error::AppError;
use crate::platform::ProcessActions;
use crate::session::{ClearOutcome, RestoreReport, SaveOutcome, SessionService};
use crate::settings::SettingsStore;
use crate::timer::{remaining_secs, ReopenTimerService, SnapshotRestorer, TimerListener};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RestoreOutcome {
    Scheduled { delay_secs: u64 },
    Restored(RestoreReport),
}

/// The two global shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotkeyAction {
    Save,
    Restore,
}

#[derive(Debug, Clone)]
pub enum HotkeyOutcome {
    Saved(SaveOutcome),
    Restore(RestoreOutcome),
}

/// A setter result: `Ok(Some(warning))` when the value took effect for this
/// process but could not be written to disk.
pub type SettingResult = Result<Option<String>, AppError>;

fn setting_result(result: Result<(), AppError>) -> SettingResult {
    match result {
        Ok(()) => Ok(None),
        Err(e) if e.is_warning() => {
            warn!("{e}");
            Ok(Some(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

pub struct SessionOrchestrator {
    settings: Arc<SettingsStore>,
    session: Arc<SessionService>,
    timer: ReopenTimerService,
}

impl SessionOrchestrator {
    pub fn new(db: &Arc<Mutex<Database>>, actions: Arc<dyn ProcessActions>) -> Result<Self, AppError> {
        let settings = Arc::new(SettingsStore::load(Arc::clone(db))?);
        let session = Arc::new(SessionService::new(Arc::clone(db), actions)?);
        let timer = ReopenTimerService::new(Arc::clone(&session) as Arc<dyn SnapshotRestorer>);
        Ok(Self::from_parts(settings, session, timer))
    }

    pub fn from_parts(settings: Arc<SettingsStore>, session: Arc<SessionService>, timer: ReopenTimerService) -> Self {
        Self {
            settings,
            session,
            timer,
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn session(&self) -> &SessionService {
        &self.session
    }

    pub fn timer(&self) -> &ReopenTimerService {
        &self.timer
    }

    pub fn set_timer_listener(&self, listener: TimerListener) {
        self.timer.set_listener(listener);
    }

    pub fn view(&self) -> SessionView {
        let current = self.session.current();
        SessionView::build(
            current.as_ref(),
            self.session.is_busy(),
            self.timer.remaining(),
            self.settings.snapshot(),
        )
    }

    /// Save the running applications. A pending delayed restore is cancelled
    /// first since the new session replaces the one it would reopen.
    pub fn save(&self) -> Result<SaveOutcome, AppError> {
        if self.timer.cancel() {
            info!("Pending restore cancelled by a new save");
        }
        self.session.save(&self.settings.snapshot())
    }

    /// Restore the stored session, after the configured delay when
    /// `wait_before_restore` is set.
    pub fn restore(&self) -> Result<RestoreOutcome, AppError> {
        let settings = self.settings.snapshot();
        if settings.wait_before_restore {
            return self.schedule_restore(settings.restore_delay());
        }
        self.restore_now().map(RestoreOutcome::Restored)
    }

    /// Restore immediately, ignoring `wait_before_restore`.
    pub fn restore_now(&self) -> Result<RestoreReport, AppError> {
        if self.timer.cancel() {
            info!("Pending restore replaced by an immediate restore");
        }
        self.session.restore_current()
    }

    /// Start (or restart) the countdown for the stored session.
    pub fn schedule_restore(&self, delay: Duration) -> Result<RestoreOutcome, AppError> {
        if self.session.is_busy() {
            return Err(AppError::Busy { operation: "restore" });
        }
        let snapshot = self.session.current().ok_or(AppError::NoSession)?;
        self.timer.start(snapshot, delay);
        Ok(RestoreOutcome::Scheduled {
            delay_secs: remaining_secs(delay),
        })
    }

    pub fn cancel_timer(&self) -> bool {
        self.timer.cancel()
    }

    /// Discard the stored session and any pending restore of it. A no-op
    /// without a session.
    pub fn clear_session(&self) -> ClearOutcome {
        self.timer.cancel();
        self.session.clear()
    }

    pub fn handle_hotkey(&self, action: HotkeyAction) -> Result<HotkeyOutcome, AppError> {
        info!("Hotkey: {action:?}");
        match action {
            HotkeyAction::Save => self.save().map(HotkeyOutcome::Saved),
            HotkeyAction::Restore => self.restore().map(HotkeyOutcome::Restore),
        }
    }

    pub fn save_in_background<F>(self: &Arc<Self>, done: F) -> thread::JoinHandle<()>
    where
        F: FnOnce(Result<SaveOutcome, AppError>) + Send + 'static,
    {
        let this = Arc::clone(self);
        thread::spawn(move || done(this.save()))
    }

    pub fn restore_in_background<F>(self: &Arc<Self>, done: F) -> thread::JoinHandle<()>
    where
        F: FnOnce(Result<RestoreOutcome, AppError>) + Send + 'static,
    {
        let this = Arc::clone(self);
        thread::spawn(move || done(this.restore()))
    }

    pub fn set_ignore_system_apps(&self, value: bool) -> SettingResult {
        setting_result(self.settings.set_ignore_system_apps(value))
    }

    pub fn set_quit_apps_instead_of_hiding(&self, value: bool) -> SettingResult {
        setting_result(self.settings.set_quit_apps_instead_of_hiding(value))
    }

    pub fn set_wait_before_restore(&self, value: bool) -> SettingResult {
        setting_result(self.settings.set_wait_before_restore(value))
    }

    pub fn set_selected_timer_option(&self, value: Option<&str>) -> SettingResult {
        setting_result(self.settings.set_selected_timer_option(value))
    }

    pub fn set_launch_at_login(&self, value: bool) -> SettingResult {
        setting_result(self.settings.set_launch_at_login(value))
    }

    pub fn add_ignored_bundle_id(&self, bundle_id: &str) -> SettingResult {
        setting_result(self.settings.add_ignored_bundle_id(bundle_id).map(|_| ()))
    }

    pub fn remove_ignored_bundle_id(&self, bundle_id: &str) -> SettingResult {
        setting_result(self.settings.remove_ignored_bundle_id(bundle_id).map(|_| ()))
    }

    /// Set any setting from its textual form.
    pub fn set_setting(&self, key: &str, value: &str) -> SettingResult {
        setting_result(self.settings.set_from_text(key, value))
    }
}

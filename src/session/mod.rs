//! Save and restore of the running application set.

use crate::db::{lock_db, with_connection, Database};
use crate::error::AppError;
use crate::filter;
use crate::models::{AppIdentity, RunningApp, SessionSnapshot, Settings};
use crate::platform::{PlatformError, ProcessActions};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;

/// What a save does to every included application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveAction {
    Hide,
    Terminate,
}

impl SaveAction {
    pub fn for_settings(settings: &Settings) -> Self {
        if settings.quit_apps_instead_of_hiding {
            SaveAction::Terminate
        } else {
            SaveAction::Hide
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            SaveAction::Hide => "hide",
            SaveAction::Terminate => "quit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ActionStatus {
    Done,
    Failed(String),
}

/// Result of one hide/terminate/open call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppOutcome {
    pub identity: AppIdentity,
    pub display_name: String,
    pub status: ActionStatus,
}

impl AppOutcome {
    fn new(app: &RunningApp, result: Result<(), PlatformError>) -> Self {
        Self {
            identity: app.identity(),
            display_name: app.display_name.clone(),
            status: match result {
                Ok(()) => ActionStatus::Done,
                Err(e) => ActionStatus::Failed(e.to_string()),
            },
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == ActionStatus::Done
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    /// Empty when no running application qualified; the previous session is
    /// then left in place.
    pub snapshot: SessionSnapshot,
    pub action: SaveAction,
    pub outcomes: Vec<AppOutcome>,
    pub excluded: usize,
    pub persistence_warning: Option<String>,
}

impl SaveOutcome {
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub outcomes: Vec<AppOutcome>,
    pub persistence_warning: Option<String>,
}

impl RestoreReport {
    pub fn opened(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.opened()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClearOutcome {
    /// Whether a session existed and was forgotten.
    pub cleared: bool,
    pub persistence_warning: Option<String>,
}

/// Collapse duplicate descriptors of the same application.
///
/// The first occurrence keeps its position; if any duplicate is frontmost the
/// kept entry is marked frontmost, and at most one entry ends up frontmost.
pub fn dedup_by_identity(apps: Vec<RunningApp>) -> Vec<RunningApp> {
    let mut positions: HashMap<AppIdentity, usize> = HashMap::new();
    let mut unique: Vec<RunningApp> = Vec::with_capacity(apps.len());

    for app in apps {
        match positions.entry(app.identity()) {
            Entry::Occupied(slot) => {
                if app.is_frontmost {
                    if let Some(kept) = unique.get_mut(*slot.get()) {
                        kept.is_frontmost = true;
                    }
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(unique.len());
                unique.push(app);
            }
        }
    }

    let mut seen_frontmost = false;
    for app in &mut unique {
        if app.is_frontmost {
            app.is_frontmost = !seen_frontmost;
            seen_frontmost = true;
        }
    }
    unique
}

/// Run `f` for every item on its own scoped thread and collect the results in
/// input order once all of them have finished.
fn for_each_concurrently<T, F>(items: &[T], f: F) -> Vec<Result<(), PlatformError>>
where
    T: Sync,
    F: Fn(&T) -> Result<(), PlatformError> + Sync,
{
    let f = &f;
    thread::scope(|scope| {
        let handles: Vec<_> = items.iter().map(|item| scope.spawn(move || f(item))).collect();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    Err(PlatformError::Command {
                        command: "application action".to_string(),
                        reason: "worker panicked".to_string(),
                    })
                })
            })
            .collect()
    })
}

pub struct SessionService {
    db: Arc<Mutex<Database>>,
    actions: Arc<dyn ProcessActions>,
    current: Mutex<Option<SessionSnapshot>>,
    /// Held for the whole of a save, restore or clear.
    operation: Mutex<()>,
}

impl SessionService {
    /// Build the service and pick up a session saved by a previous run.
    pub fn new(db: Arc<Mutex<Database>>, actions: Arc<dyn ProcessActions>) -> Result<Self, AppError> {
        let stored = with_connection(&db, "load saved session", SessionSnapshot::load)?;
        if let Some(snapshot) = &stored {
            info!("Found saved session with {} apps", snapshot.len());
        }

        Ok(Self {
            db,
            actions,
            current: Mutex::new(stored),
            operation: Mutex::new(()),
        })
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<SessionSnapshot>> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Enter the operation gate. Without `wait`, an operation already in
    /// flight makes this fail with [`AppError::Busy`].
    fn begin(&self, operation: &'static str, wait: bool) -> Result<MutexGuard<'_, ()>, AppError> {
        if wait {
            return Ok(self.operation.lock().unwrap_or_else(|p| p.into_inner()));
        }
        match self.operation.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                warn!("Rejected {operation}: another operation is in progress");
                Err(AppError::Busy { operation })
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.operation.try_lock(), Err(TryLockError::WouldBlock))
    }

    /// Read-only copy of the stored session.
    pub fn current(&self) -> Option<SessionSnapshot> {
        self.lock_current().clone()
    }

    pub fn has_session(&self) -> bool {
        self.lock_current().is_some()
    }

    fn persist<F>(&self, operation: &str, f: F) -> Result<(), AppError>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<()>,
    {
        let db = lock_db(&self.db, operation);
        f(db.connection()).map_err(|e| {
            error!("Failed to {operation}: {e}");
            AppError::persistence("session", e)
        })
    }

    /// Snapshot, filter and put away the running applications.
    ///
    /// `settings` is the single settings snapshot used for the whole save.
    pub fn save(&self, settings: &Settings) -> Result<SaveOutcome, AppError> {
        let _gate = self.begin("save", false)?;

        let running = self.actions.list_running_applications().map_err(|e| {
            error!("Failed to enumerate running applications: {e}");
            AppError::EnumerationFailed { reason: e.to_string() }
        })?;
        let discovered = running.len();

        let (included, excluded): (Vec<_>, Vec<_>) = dedup_by_identity(running)
            .into_iter()
            .partition(|app| filter::should_include(app, settings));
        for app in &excluded {
            let reasons: Vec<_> = filter::exclusion_reasons(app, settings)
                .into_iter()
                .map(filter::ExclusionReason::as_str)
                .collect();
            debug!("Skipping {} ({})", app.display_name, reasons.join(", "));
        }

        let action = SaveAction::for_settings(settings);
        let results = for_each_concurrently(&included, |app| match action {
            SaveAction::Hide => self.actions.hide(app),
            SaveAction::Terminate => self.actions.terminate(app),
        });
        let outcomes: Vec<AppOutcome> = included
            .iter()
            .zip(results)
            .map(|(app, result)| AppOutcome::new(app, result))
            .collect();
        for outcome in outcomes.iter().filter(|o| !o.succeeded()) {
            if let ActionStatus::Failed(reason) = &outcome.status {
                warn!("Could not {} {}: {reason}", action.verb(), outcome.display_name);
            }
        }

        if included.is_empty() {
            info!("Nothing to save: {discovered} running, {} excluded", excluded.len());
            return Ok(SaveOutcome {
                snapshot: SessionSnapshot::new(Vec::new()),
                action,
                outcomes,
                excluded: excluded.len(),
                persistence_warning: None,
            });
        }

        let snapshot = SessionSnapshot::new(included);
        let persistence_warning = self
            .persist("save session", |conn| snapshot.save(conn))
            .err()
            .map(|e| e.to_string());
        *self.lock_current() = Some(snapshot.clone());

        info!(
            "Saved session: {} apps ({}), {} excluded, {} failed",
            snapshot.len(),
            action.verb(),
            excluded.len(),
            outcomes.iter().filter(|o| !o.succeeded()).count()
        );

        Ok(SaveOutcome {
            snapshot,
            action,
            outcomes,
            excluded: excluded.len(),
            persistence_warning,
        })
    }

    /// Reopen every application of `snapshot` through the OS launcher.
    pub fn restore(&self, snapshot: &SessionSnapshot) -> Result<RestoreReport, AppError> {
        let _gate = self.begin("restore", false)?;
        Ok(self.restore_locked(snapshot))
    }

    /// Like [`restore`](Self::restore) but waits for an in-flight operation
    /// instead of rejecting.
    pub fn restore_queued(&self, snapshot: &SessionSnapshot) -> RestoreReport {
        let _gate = self.begin("restore", true);
        self.restore_locked(snapshot)
    }

    /// Restore the stored session. A session can be restored only once.
    pub fn restore_current(&self) -> Result<RestoreReport, AppError> {
        let _gate = self.begin("restore", false)?;
        let snapshot = self.current().ok_or(AppError::NoSession)?;
        Ok(self.restore_locked(&snapshot))
    }

    fn restore_locked(&self, snapshot: &SessionSnapshot) -> RestoreReport {
        let results = for_each_concurrently(&snapshot.apps, |app| self.actions.open(&app.identity()));
        let outcomes: Vec<AppOutcome> = snapshot
            .apps
            .iter()
            .zip(results)
            .map(|(app, result)| AppOutcome::new(app, result))
            .collect();
        for outcome in &outcomes {
            if let ActionStatus::Failed(reason) = &outcome.status {
                warn!("Could not reopen {}: {reason}", outcome.display_name);
            }
        }

        let persistence_warning = {
            let mut current = self.lock_current();
            if current.as_ref().is_some_and(|stored| stored.same_session(snapshot)) {
                *current = None;
                self.persist("clear restored session", |conn| SessionSnapshot::clear(conn).map(|_| ()))
                    .err()
                    .map(|e| e.to_string())
            } else {
                None
            }
        };

        let report = RestoreReport {
            outcomes,
            persistence_warning,
        };
        info!(
            "Restored session: {} opened, {} failed",
            report.opened(),
            report.failed()
        );
        report
    }

    /// Forget the stored session without restoring it. Calling it with no
    /// session is a no-op. The in-memory session is dropped even when the
    /// stored copy cannot be removed; that failure comes back as a warning.
    pub fn clear(&self) -> ClearOutcome {
        let _gate = self.begin("clear", true);
        let existed = self.lock_current().take().is_some();
        if !existed {
            return ClearOutcome::default();
        }

        let persistence_warning = self
            .persist("clear session", |conn| SessionSnapshot::clear(conn).map(|_| ()))
            .err()
            .map(|e| e.to_string());
        info!("Cleared saved session");
        ClearOutcome {
            cleared: true,
            persistence_warning,
        }
    }
}

//! Shared test utilities for Shelf.
//!
//! Temporary databases and a recording [`ProcessActions`] fake.

#![cfg(test)]

use crate::db::{migrations, Database};
use crate::models::{AppIdentity, RunningApp};
use crate::platform::{PlatformError, ProcessActions};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

/// Create a temporary test database with migrations applied.
///
/// Returns a tuple of (Database, TempDir). The TempDir must be kept alive
/// for the duration of the test to prevent the database file from being deleted.
pub fn setup_test_db() -> (Database, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test DB");
    let db_path = dir.path().join("test.db");
    let db = Database::open(&db_path).expect("Failed to open test database");
    migrations::run(db.connection()).expect("Failed to run migrations on test DB");
    (db, dir)
}

/// Same as [`setup_test_db`], wrapped for sharing between services.
pub fn setup_shared_db() -> (Arc<Mutex<Database>>, TempDir) {
    let (db, dir) = setup_test_db();
    (Arc::new(Mutex::new(db)), dir)
}

/// A macOS-style app descriptor: `com.example.safari` becomes
/// `/Applications/safari.app` with its executable inside `Contents/MacOS`.
pub fn sample_app(bundle_id: &str) -> RunningApp {
    let name = bundle_id.rsplit('.').next().unwrap_or(bundle_id);
    let bundle = format!("/Applications/{name}.app");
    RunningApp::new(Some(bundle_id), bundle.clone(), name)
        .with_executable(format!("{bundle}/Contents/MacOS/{name}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Hide(AppIdentity),
    Terminate(AppIdentity),
    Open(AppIdentity),
}

/// Records every call and answers from a fixed list of running apps.
#[derive(Default)]
pub struct FakeActions {
    apps: Mutex<Vec<RunningApp>>,
    calls: Mutex<Vec<Call>>,
    fail_enumeration: AtomicBool,
    failing: Mutex<HashSet<AppIdentity>>,
    action_delay: Mutex<Option<Duration>>,
}

impl FakeActions {
    pub fn new(apps: Vec<RunningApp>) -> Self {
        Self {
            apps: Mutex::new(apps),
            ..Self::default()
        }
    }

    pub fn set_apps(&self, apps: Vec<RunningApp>) {
        *self.apps.lock().unwrap() = apps;
    }

    pub fn fail_enumeration(&self) {
        self.fail_enumeration.store(true, Ordering::SeqCst);
    }

    /// Make hide/terminate/open fail for one application.
    pub fn fail_for(&self, identity: AppIdentity) {
        self.failing.lock().unwrap().insert(identity);
    }

    /// Slow down every per-app action, to keep an operation in flight.
    pub fn set_action_delay(&self, delay: Duration) {
        *self.action_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<AppIdentity> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Open(identity) => Some(identity),
                Call::List | Call::Hide(_) | Call::Terminate(_) => None,
            })
            .collect()
    }

    pub fn hidden(&self) -> Vec<AppIdentity> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Hide(identity) => Some(identity),
                Call::List | Call::Open(_) | Call::Terminate(_) => None,
            })
            .collect()
    }

    pub fn terminated(&self) -> Vec<AppIdentity> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Terminate(identity) => Some(identity),
                Call::List | Call::Open(_) | Call::Hide(_) => None,
            })
            .collect()
    }

    fn act(&self, call: Call, identity: &AppIdentity) -> Result<(), PlatformError> {
        let delay = *self.action_delay.lock().unwrap();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        self.calls.lock().unwrap().push(call);
        if self.failing.lock().unwrap().contains(identity) {
            return Err(PlatformError::Refused(identity.to_string()));
        }
        Ok(())
    }
}

impl ProcessActions for FakeActions {
    fn list_running_applications(&self) -> Result<Vec<RunningApp>, PlatformError> {
        self.calls.lock().unwrap().push(Call::List);
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(PlatformError::PermissionDenied("test".to_string()));
        }
        Ok(self.apps.lock().unwrap().clone())
    }

    fn hide(&self, app: &RunningApp) -> Result<(), PlatformError> {
        let identity = app.identity();
        self.act(Call::Hide(identity.clone()), &identity)
    }

    fn terminate(&self, app: &RunningApp) -> Result<(), PlatformError> {
        let identity = app.identity();
        self.act(Call::Terminate(identity.clone()), &identity)
    }

    fn open(&self, target: &AppIdentity) -> Result<(), PlatformError> {
        self.act(Call::Open(target.clone()), target)
    }
}

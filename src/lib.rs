pub mod constants;
pub mod control;
pub mod db;
pub mod error;
pub mod filter;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod platform;
pub mod session;
pub mod settings;
#[cfg(test)]
mod test_utils;
pub mod timer;
pub mod validation;

use crate::db::{migrations, Database};
use crate::orchestrator::SessionOrchestrator;
use crate::platform::{NativeActions, ProcessActions};
use directories::ProjectDirs;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Error type for Shelf start-up failures
#[derive(Debug)]
pub enum InitError {
    NoProjectDirs,
    DataDirCreation(std::io::Error),
    DatabaseOpen(rusqlite::Error),
    Migration(rusqlite::Error),
    Services(error::AppError),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitError::NoProjectDirs => write!(f, "Could not determine project directories"),
            InitError::DataDirCreation(e) => write!(f, "Could not create data directory: {e}"),
            InitError::DatabaseOpen(e) => write!(f, "Failed to open database: {e}"),
            InitError::Migration(e) => write!(f, "Failed to run database migrations: {e}"),
            InitError::Services(e) => write!(f, "Failed to start: {e}"),
        }
    }
}

impl std::error::Error for InitError {}

/// `shelf.db` in the platform data directory.
pub fn default_db_path() -> Result<PathBuf, InitError> {
    let proj_dirs = ProjectDirs::from("com", "shelf", "Shelf").ok_or(InitError::NoProjectDirs)?;
    Ok(proj_dirs.data_dir().join("shelf.db"))
}

/// Open (creating if needed) and migrate the database at `path`.
pub fn open_database(path: &Path) -> Result<Arc<Mutex<Database>>, InitError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(InitError::DataDirCreation)?;
    }

    let db = Database::open(path).map_err(|e| {
        error!("Failed to open database at {}: {e}", path.display());
        InitError::DatabaseOpen(e)
    })?;
    migrations::run(db.connection()).map_err(|e| {
        error!("Failed to run migrations: {e}");
        InitError::Migration(e)
    })?;

    info!("Using database {}", path.display());
    Ok(Arc::new(Mutex::new(db)))
}

/// The adapter for the platform this binary was built for.
pub fn native_actions() -> Arc<dyn ProcessActions> {
    Arc::new(NativeActions::new())
}

pub fn build_orchestrator(
    db: &Arc<Mutex<Database>>,
    actions: Arc<dyn ProcessActions>,
) -> Result<SessionOrchestrator, InitError> {
    SessionOrchestrator::new(db, actions).map_err(|e| {
        error!("Failed to start services: {e}");
        InitError::Services(e)
    })
}

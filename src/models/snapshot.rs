use super::{current_timestamp, AppIdentity, RunningApp};
use rusqlite::{params, Connection, OptionalExtension, Result};
use serde::Serialize;
use std::path::PathBuf;

/// The applications recorded by a save, in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub apps: Vec<RunningApp>,
    pub created_at: i64,
}

impl SessionSnapshot {
    pub fn new(apps: Vec<RunningApp>) -> Self {
        Self {
            apps,
            created_at: current_timestamp(),
        }
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn identities(&self) -> Vec<AppIdentity> {
        self.apps.iter().map(RunningApp::identity).collect()
    }

    /// Whether `other` records the same session, ignoring fields that are not
    /// persisted (such as executable paths).
    pub fn same_session(&self, other: &SessionSnapshot) -> bool {
        self.created_at == other.created_at && self.identities() == other.identities()
    }

    /// Store this snapshot, replacing any previously saved session.
    pub fn save(&self, conn: &Connection) -> Result<()> {
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM saved_session_apps", [])?;
        tx.execute("DELETE FROM saved_session", [])?;
        tx.execute(
            "INSERT INTO saved_session (created_at) VALUES (?1)",
            params![self.created_at],
        )?;
        let session_id = tx.last_insert_rowid();

        for (position, app) in (0_i64..).zip(&self.apps) {
            tx.execute(
                "INSERT INTO saved_session_apps
                 (session_id, position, bundle_identifier, bundle_path, display_name, is_frontmost)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session_id,
                    position,
                    app.bundle_identifier,
                    app.bundle_path.to_string_lossy().into_owned(),
                    app.display_name,
                    app.is_frontmost,
                ],
            )?;
        }

        tx.commit()
    }

    /// Load the saved session, if any.
    pub fn load(conn: &Connection) -> Result<Option<Self>> {
        let session: Option<(i64, i64)> = conn
            .query_row(
                "SELECT id, created_at FROM saved_session ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((session_id, created_at)) = session else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT bundle_identifier, bundle_path, display_name, is_frontmost
             FROM saved_session_apps WHERE session_id = ?1 ORDER BY position",
        )?;

        let apps = stmt
            .query_map(params![session_id], |row| {
                Ok(RunningApp {
                    bundle_identifier: row.get(0)?,
                    bundle_path: PathBuf::from(row.get::<_, String>(1)?),
                    display_name: row.get(2)?,
                    is_frontmost: row.get::<_, Option<bool>>(3)?.unwrap_or(false),
                    executable_path: None,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Self { apps, created_at }))
    }

    /// Remove the saved session. Returns whether one existed.
    pub fn clear(conn: &Connection) -> Result<bool> {
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM saved_session_apps", [])?;
        let removed = tx.execute("DELETE FROM saved_session", [])?;
        tx.commit()?;
        Ok(removed > 0)
    }
}

pub mod helpers;
pub mod migrations;
pub mod schema;
pub use helpers::{lock_db, with_connection};

use rusqlite::{Connection, Result};
use std::path::Path;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_database_opens() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let _db = Database::open(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_all_tables_created() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        migrations::run(db.connection()).unwrap();

        let expected_tables = ["settings", "saved_session", "saved_session_apps"];
        for table in &expected_tables {
            let count: i32 = db
                .connection()
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {table} should exist");
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();

        migrations::run(db.connection()).unwrap();
        db.connection()
            .execute(
                "INSERT INTO settings (key, value) VALUES ('wait_before_restore', 'true')",
                [],
            )
            .unwrap();
        migrations::run(db.connection()).unwrap();

        let count: i32 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM settings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1, "Running migrations twice should keep existing settings");
    }

    #[test]
    fn test_legacy_setting_keys_renamed() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        db.connection().execute_batch(schema::SCHEMA).unwrap();
        db.connection()
            .execute(
                "INSERT INTO settings (key, value) VALUES ('quitAppsInsteadOfHiding', '1')",
                [],
            )
            .unwrap();

        migrations::run(db.connection()).unwrap();

        let value: String = db
            .connection()
            .query_row(
                "SELECT value FROM settings WHERE key = 'quit_apps_instead_of_hiding'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, "1");

        let legacy: i32 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM settings WHERE key = 'quitAppsInsteadOfHiding'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(legacy, 0);
    }

    #[test]
    fn test_legacy_key_does_not_override_current_value() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        db.connection().execute_batch(schema::SCHEMA).unwrap();
        db.connection()
            .execute_batch(
                "INSERT INTO settings (key, value) VALUES ('waitBeforeRestore', 'true');
                 INSERT INTO settings (key, value) VALUES ('wait_before_restore', 'false');",
            )
            .unwrap();

        migrations::run(db.connection()).unwrap();

        let value: String = db
            .connection()
            .query_row(
                "SELECT value FROM settings WHERE key = 'wait_before_restore'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, "false");
    }
}

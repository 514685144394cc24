//! Persistent user preferences.
//!
//! Each setting is one row of the `settings` table. Every setter writes
//! through immediately (one autocommitted statement), so a change survives a
//! crash right after the call returns. An in-memory copy is kept so reads never
//! touch the database and so a failed write still takes effect for the
//! running process.

use crate::db::{lock_db, Database};
use crate::error::AppError;
use crate::models::Settings;
use crate::validation::{parse_bool, validate_bundle_id, validate_ignore_list_len};
use log::{info, warn};
use rusqlite::{params, Connection};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const KEY_IGNORE_SYSTEM_APPS: &str = "ignore_system_apps";
pub const KEY_CUSTOM_IGNORED_BUNDLE_IDS: &str = "custom_ignored_bundle_ids";
pub const KEY_QUIT_APPS_INSTEAD_OF_HIDING: &str = "quit_apps_instead_of_hiding";
pub const KEY_WAIT_BEFORE_RESTORE: &str = "wait_before_restore";
pub const KEY_SELECTED_TIMER_OPTION: &str = "selected_timer_option";
pub const KEY_LAUNCH_AT_LOGIN: &str = "launch_at_login";

pub struct SettingsStore {
    db: Arc<Mutex<Database>>,
    cache: RwLock<Settings>,
}

impl SettingsStore {
    /// Read every setting once, falling back to defaults for absent or
    /// unreadable values.
    pub fn load(db: Arc<Mutex<Database>>) -> Result<Self, AppError> {
        let raw = {
            let guard = lock_db(&db, "SettingsStore");
            read_all(guard.connection())?
        };
        let settings = settings_from_raw(&raw);
        info!("Loaded settings ({} stored keys)", raw.len());

        Ok(Self {
            db,
            cache: RwLock::new(settings),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.cache.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, Settings> {
        self.cache.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Immutable copy for the duration of one operation.
    pub fn snapshot(&self) -> Settings {
        self.read().clone()
    }

    pub fn ignore_system_apps(&self) -> bool {
        self.read().ignore_system_apps
    }

    pub fn custom_ignored_bundle_ids(&self) -> BTreeSet<String> {
        self.read().custom_ignored_bundle_ids.clone()
    }

    pub fn quit_apps_instead_of_hiding(&self) -> bool {
        self.read().quit_apps_instead_of_hiding
    }

    pub fn wait_before_restore(&self) -> bool {
        self.read().wait_before_restore
    }

    pub fn selected_timer_option(&self) -> Option<String> {
        self.read().selected_timer_option.clone()
    }

    pub fn launch_at_login(&self) -> bool {
        self.read().launch_at_login
    }

    /// Apply `change` to the cached settings and write `key` through while
    /// still holding the cache lock, so memory and disk see writes in the
    /// same order.
    fn update<F>(&self, key: &'static str, change: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut Settings) -> Option<String>,
    {
        let mut cache = self.write_cache();
        let value = change(&mut cache);
        self.persist(key, value)
    }

    pub fn set_ignore_system_apps(&self, value: bool) -> Result<(), AppError> {
        self.update(KEY_IGNORE_SYSTEM_APPS, |s| {
            s.ignore_system_apps = value;
            Some(value.to_string())
        })
    }

    pub fn set_quit_apps_instead_of_hiding(&self, value: bool) -> Result<(), AppError> {
        self.update(KEY_QUIT_APPS_INSTEAD_OF_HIDING, |s| {
            s.quit_apps_instead_of_hiding = value;
            Some(value.to_string())
        })
    }

    pub fn set_wait_before_restore(&self, value: bool) -> Result<(), AppError> {
        self.update(KEY_WAIT_BEFORE_RESTORE, |s| {
            s.wait_before_restore = value;
            Some(value.to_string())
        })
    }

    /// Any label is stored as given; unknown labels resolve to the default delay.
    pub fn set_selected_timer_option(&self, value: Option<&str>) -> Result<(), AppError> {
        let value = value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        self.update(KEY_SELECTED_TIMER_OPTION, |s| {
            s.selected_timer_option.clone_from(&value);
            value
        })
    }

    pub fn set_launch_at_login(&self, value: bool) -> Result<(), AppError> {
        self.update(KEY_LAUNCH_AT_LOGIN, |s| {
            s.launch_at_login = value;
            Some(value.to_string())
        })
    }

    pub fn set_custom_ignored_bundle_ids(&self, ids: BTreeSet<String>) -> Result<(), AppError> {
        let ids = ids
            .iter()
            .map(|id| validate_bundle_id(id))
            .collect::<Result<BTreeSet<_>, _>>()?;
        validate_ignore_list_len(ids.len())?;

        let encoded = encode_id_list(&ids);
        self.update(KEY_CUSTOM_IGNORED_BUNDLE_IDS, |s| {
            s.custom_ignored_bundle_ids = ids;
            Some(encoded)
        })
    }

    /// Read, change and write back the ignore list under one cache lock.
    /// Returns `false` without writing when `change` reports no change.
    fn update_ignored<F>(&self, change: F) -> Result<bool, AppError>
    where
        F: FnOnce(&mut BTreeSet<String>) -> bool,
    {
        let mut cache = self.write_cache();
        let mut ids = cache.custom_ignored_bundle_ids.clone();
        if !change(&mut ids) {
            return Ok(false);
        }
        validate_ignore_list_len(ids.len())?;

        let encoded = encode_id_list(&ids);
        cache.custom_ignored_bundle_ids = ids;
        self.persist(KEY_CUSTOM_IGNORED_BUNDLE_IDS, Some(encoded))?;
        Ok(true)
    }

    /// Returns whether the identifier was newly added.
    pub fn add_ignored_bundle_id(&self, bundle_id: &str) -> Result<bool, AppError> {
        let bundle_id = validate_bundle_id(bundle_id)?;
        self.update_ignored(|ids| ids.insert(bundle_id))
    }

    /// Returns whether the identifier was present.
    pub fn remove_ignored_bundle_id(&self, bundle_id: &str) -> Result<bool, AppError> {
        let bundle_id = bundle_id.trim();
        self.update_ignored(|ids| ids.remove(bundle_id))
    }

    /// Set a value from its textual form, as typed on the command line or sent
    /// over the control protocol.
    pub fn set_from_text(&self, key: &str, value: &str) -> Result<(), AppError> {
        let parse_flag = |field: &'static str| {
            parse_bool(value).ok_or_else(|| AppError::InvalidInput {
                field,
                reason: format!("expected true or false, got '{value}'"),
            })
        };

        match key {
            KEY_IGNORE_SYSTEM_APPS => self.set_ignore_system_apps(parse_flag(KEY_IGNORE_SYSTEM_APPS)?),
            KEY_QUIT_APPS_INSTEAD_OF_HIDING => {
                self.set_quit_apps_instead_of_hiding(parse_flag(KEY_QUIT_APPS_INSTEAD_OF_HIDING)?)
            }
            KEY_WAIT_BEFORE_RESTORE => self.set_wait_before_restore(parse_flag(KEY_WAIT_BEFORE_RESTORE)?),
            KEY_LAUNCH_AT_LOGIN => self.set_launch_at_login(parse_flag(KEY_LAUNCH_AT_LOGIN)?),
            KEY_SELECTED_TIMER_OPTION => self.set_selected_timer_option(Some(value)),
            KEY_CUSTOM_IGNORED_BUNDLE_IDS => self.set_custom_ignored_bundle_ids(decode_id_list(value)),
            _ => Err(AppError::InvalidInput {
                field: "key",
                reason: format!("unknown setting '{key}'"),
            }),
        }
    }

    fn persist(&self, key: &'static str, value: Option<String>) -> Result<(), AppError> {
        let db = lock_db(&self.db, "SettingsStore");
        write_value(db.connection(), key, value.as_deref()).map_err(|e| {
            warn!("Failed to persist setting {key}: {e}");
            AppError::persistence("settings", e)
        })
    }
}

fn read_all(conn: &Connection) -> rusqlite::Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

fn write_value(conn: &Connection, key: &str, value: Option<&str>) -> rusqlite::Result<()> {
    match value {
        Some(value) => conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?,
        None => conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?,
    };
    Ok(())
}

fn settings_from_raw(raw: &HashMap<String, String>) -> Settings {
    let defaults = Settings::default();

    let flag = |key: &str, default: bool| match raw.get(key) {
        None => default,
        Some(value) => parse_bool(value).unwrap_or_else(|| {
            warn!("Ignoring unreadable value '{value}' for {key}");
            default
        }),
    };

    Settings {
        ignore_system_apps: flag(KEY_IGNORE_SYSTEM_APPS, defaults.ignore_system_apps),
        custom_ignored_bundle_ids: raw
            .get(KEY_CUSTOM_IGNORED_BUNDLE_IDS)
            .map(|value| decode_id_list(value))
            .unwrap_or(defaults.custom_ignored_bundle_ids),
        quit_apps_instead_of_hiding: flag(
            KEY_QUIT_APPS_INSTEAD_OF_HIDING,
            defaults.quit_apps_instead_of_hiding,
        ),
        wait_before_restore: flag(KEY_WAIT_BEFORE_RESTORE, defaults.wait_before_restore),
        selected_timer_option: raw
            .get(KEY_SELECTED_TIMER_OPTION)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or(defaults.selected_timer_option),
        launch_at_login: flag(KEY_LAUNCH_AT_LOGIN, defaults.launch_at_login),
    }
}

fn encode_id_list(ids: &BTreeSet<String>) -> String {
    serde_json::to_string(ids).unwrap_or_else(|_| ids.iter().cloned().collect::<Vec<_>>().join(","))
}

/// JSON array, or a comma-separated list as written by older releases.
fn decode_id_list(value: &str) -> BTreeSet<String> {
    if let Ok(ids) = serde_json::from_str::<Vec<String>>(value) {
        return ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

use super::schema::SCHEMA;
use rusqlite::{Connection, Result};

/// Settings keys written by earlier releases, paired with their current name.
pub const LEGACY_SETTING_KEYS: &[(&str, &str)] = &[
    ("ignoreSystemApps", "ignore_system_apps"),
    ("customIgnoredBundleIDs", "custom_ignored_bundle_ids"),
    ("quitAppsInsteadOfHiding", "quit_apps_instead_of_hiding"),
    ("waitBeforeRestore", "wait_before_restore"),
    ("selectedTimerOption", "selected_timer_option"),
    ("launchAtLogin", "launch_at_login"),
];

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    rename_legacy_setting_keys(conn)?;
    Ok(())
}

/// Copy values stored under legacy keys to the current key names.
///
/// A value already present under the current name wins; legacy rows are removed
/// either way.
fn rename_legacy_setting_keys(conn: &Connection) -> Result<()> {
    for (legacy, current) in LEGACY_SETTING_KEYS {
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value)
             SELECT ?2, value FROM settings WHERE key = ?1",
            [*legacy, *current],
        )?;
        conn.execute("DELETE FROM settings WHERE key = ?1", [*legacy])?;
    }
    Ok(())
}

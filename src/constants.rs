// src/constants.rs

use std::time::Duration;

/// Bundle identifiers of OS-bundled utilities that are left alone when
/// "ignore system apps" is enabled. Matched by identifier, never by the
/// localized display name.
pub const SYSTEM_BUNDLE_IDS: &[&str] = &[
    // macOS
    "com.apple.finder",
    "com.apple.ActivityMonitor",
    "com.apple.systempreferences",
    "com.apple.SystemPreferences",
    "com.apple.AppStore",
    // GNOME
    "org.gnome.Nautilus",
    "org.gnome.SystemMonitor",
    "gnome-system-monitor",
    "org.gnome.Settings",
    "gnome-control-center",
    "org.gnome.Software",
    // KDE
    "org.kde.dolphin",
    "org.kde.plasma-systemmonitor",
    "systemsettings",
    "org.kde.discover",
];

/// Delay used when the selected timer option is missing or unrecognized.
pub const DEFAULT_RESTORE_DELAY: Duration = Duration::from_secs(10);

/// How often the reopen timer worker wakes up to count down.
pub const TIMER_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum bundle identifier length accepted for the custom ignore list
pub const MAX_BUNDLE_ID_LEN: usize = 255;

/// Maximum number of entries in the custom ignore list
pub const MAX_IGNORED_BUNDLE_IDS: usize = 500;

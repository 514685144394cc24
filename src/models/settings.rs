use crate::constants::DEFAULT_RESTORE_DELAY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// User preferences, passed by value to every operation that needs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub ignore_system_apps: bool,
    pub custom_ignored_bundle_ids: BTreeSet<String>,
    pub quit_apps_instead_of_hiding: bool,
    pub wait_before_restore: bool,
    pub selected_timer_option: Option<String>,
    pub launch_at_login: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ignore_system_apps: true,
            custom_ignored_bundle_ids: BTreeSet::new(),
            quit_apps_instead_of_hiding: false,
            wait_before_restore: false,
            selected_timer_option: None,
            launch_at_login: false,
        }
    }
}

impl Settings {
    /// Delay applied before a restore when `wait_before_restore` is set.
    pub fn restore_delay(&self) -> Duration {
        TimerOption::resolve_delay(self.selected_timer_option.as_deref())
    }
}

/// Named delays offered for "wait before restore".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOption {
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    FiveHours,
}

impl TimerOption {
    pub const ALL: [TimerOption; 4] = [
        TimerOption::FifteenMinutes,
        TimerOption::ThirtyMinutes,
        TimerOption::OneHour,
        TimerOption::FiveHours,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TimerOption::FifteenMinutes => "15 minutes",
            TimerOption::ThirtyMinutes => "30 minutes",
            TimerOption::OneHour => "1 hour",
            TimerOption::FiveHours => "5 hours",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|option| option.label() == label)
    }

    pub fn duration(self) -> Duration {
        let secs = match self {
            TimerOption::FifteenMinutes => 15 * 60,
            TimerOption::ThirtyMinutes => 30 * 60,
            TimerOption::OneHour => 60 * 60,
            TimerOption::FiveHours => 5 * 60 * 60,
        };
        Duration::from_secs(secs)
    }

    /// Resolve a stored option label to a delay.
    ///
    /// Missing or unrecognized labels fall back to [`DEFAULT_RESTORE_DELAY`] so a
    /// corrupt setting can never hold a restore back indefinitely.
    pub fn resolve_delay(label: Option<&str>) -> Duration {
        match label.and_then(Self::from_label) {
            Some(option) => option.duration(),
            None => {
                if let Some(label) = label {
                    log::debug!("Unrecognized timer option '{label}', using default delay");
                }
                DEFAULT_RESTORE_DELAY
            }
        }
    }
}

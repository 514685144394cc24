use crate::models::{SessionSnapshot, Settings};
use crate::timer::remaining_secs;
use chrono::{Local, TimeZone};
use serde::Serialize;
use std::time::Duration;

/// State published to the presentation layer. Always derived from the
/// services, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub has_session: bool,
    pub session_label: Option<String>,
    pub session_date: Option<String>,
    pub app_count: usize,
    pub is_save_enabled: bool,
    pub is_timer_visible: bool,
    pub timer_label: Option<String>,
    pub settings: Settings,
}

impl SessionView {
    pub fn build(
        session: Option<&SessionSnapshot>,
        busy: bool,
        timer_remaining: Option<Duration>,
        settings: Settings,
    ) -> Self {
        Self {
            has_session: session.is_some(),
            session_label: session.map(|s| session_label(s.len())),
            session_date: session.and_then(|s| session_date(s.created_at)),
            app_count: session.map_or(0, SessionSnapshot::len),
            is_save_enabled: !busy && timer_remaining.is_none(),
            is_timer_visible: timer_remaining.is_some(),
            timer_label: timer_remaining.map(timer_label),
            settings,
        }
    }
}

pub fn session_label(app_count: usize) -> String {
    if app_count == 1 {
        "1 app".to_string()
    } else {
        format!("{app_count} apps")
    }
}

/// Local date and time of a save, e.g. `Oct 19, 14:05`.
pub fn session_date(created_at: i64) -> Option<String> {
    Local
        .timestamp_opt(created_at, 0)
        .single()
        .map(|at| at.format("%b %-d, %H:%M").to_string())
}

/// Countdown text: `mm:ss`, or `h:mm:ss` from one hour up.
pub fn timer_label(remaining: Duration) -> String {
    let total = remaining_secs(remaining);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

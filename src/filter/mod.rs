use crate::constants::SYSTEM_BUNDLE_IDS;
use crate::models::{RunningApp, Settings};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    SystemApp,
    CustomIgnored,
}

impl ExclusionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExclusionReason::SystemApp => "system app",
            ExclusionReason::CustomIgnored => "ignored",
        }
    }
}

pub fn is_system_bundle_id(bundle_id: &str) -> bool {
    SYSTEM_BUNDLE_IDS.contains(&bundle_id)
}

/// Every rule that excludes `app` under `settings`.
///
/// Rules only match on a known bundle identifier; an app without one is never
/// excluded.
pub fn exclusion_reasons(app: &RunningApp, settings: &Settings) -> Vec<ExclusionReason> {
    let Some(bundle_id) = app.bundle_identifier.as_deref() else {
        return Vec::new();
    };

    let mut reasons = Vec::new();
    if settings.ignore_system_apps && is_system_bundle_id(bundle_id) {
        reasons.push(ExclusionReason::SystemApp);
    }
    if settings.custom_ignored_bundle_ids.contains(bundle_id) {
        reasons.push(ExclusionReason::CustomIgnored);
    }
    reasons
}

/// Whether `app` takes part in save and restore.
pub fn should_include(app: &RunningApp, settings: &Settings) -> bool {
    exclusion_reasons(app, settings).is_empty()
}

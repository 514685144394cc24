use crate::constants::{MAX_BUNDLE_ID_LEN, MAX_IGNORED_BUNDLE_IDS};
use crate::error::AppError;

/// Validate a bundle identifier entered for the custom ignore list.
/// Returns the trimmed identifier.
pub fn validate_bundle_id(bundle_id: &str) -> Result<String, AppError> {
    let err = |reason: &str| AppError::InvalidInput {
        field: "bundle_id",
        reason: reason.into(),
    };

    let trimmed = bundle_id.trim();
    if trimmed.is_empty() {
        return Err(err("cannot be empty"));
    }
    if trimmed.len() > MAX_BUNDLE_ID_LEN {
        return Err(AppError::InvalidInput {
            field: "bundle_id",
            reason: format!("cannot exceed {MAX_BUNDLE_ID_LEN} characters"),
        });
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(err("cannot contain whitespace"));
    }
    Ok(trimmed.to_string())
}

/// Validate the size of the custom ignore list.
pub fn validate_ignore_list_len(len: usize) -> Result<(), AppError> {
    if len > MAX_IGNORED_BUNDLE_IDS {
        return Err(AppError::InvalidInput {
            field: "custom_ignored_bundle_ids",
            reason: format!("cannot hold more than {MAX_IGNORED_BUNDLE_IDS} entries"),
        });
    }
    Ok(())
}

/// Parse a boolean setting value as typed by a user or written by an older release.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

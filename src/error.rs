use thiserror::Error;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Could not list running applications: {reason}")]
    EnumerationFailed { reason: String },

    #[error("No saved session")]
    NoSession,

    #[error("Cannot {operation} while another save or restore is in progress")]
    Busy { operation: &'static str },

    #[error("Could not save {what}: {source}")]
    PersistenceFailed {
        what: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl AppError {
    /// Wrap a failed write so callers can surface it as a warning.
    pub fn persistence(what: &'static str, source: rusqlite::Error) -> Self {
        AppError::PersistenceFailed { what, source }
    }

    /// Whether the in-memory state was updated even though this error occurred.
    pub fn is_warning(&self) -> bool {
        matches!(self, AppError::PersistenceFailed { .. })
    }
}

// For the control protocol - converts AppError to String
impl From<AppError> for String {
    fn from(e: AppError) -> Self {
        e.to_string()
    }
}

//! Audit errors.

use thiserror::Error;

/// Errors raised while building or reading audit entries.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A before/after snapshot could not be serialized.
    #[error("Cannot snapshot entity: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// The log could not be read or appended.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AuditError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        500
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "AUDIT_SNAPSHOT_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

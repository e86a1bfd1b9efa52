//! Daily closing errors.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::AuditError;
use crate::ledger::types::Provider;
use crate::tenant::Role;

/// Errors raised while closing a day.
#[derive(Debug, Error)]
pub enum ClosingError {
    /// The day's window has not ended yet.
    #[error("Day {0} has not ended yet")]
    WindowOpen(NaiveDate),

    /// No balance account for the branch and provider.
    #[error("No {provider} balance account at branch {branch_id}")]
    AccountNotFound {
        /// Branch.
        branch_id: Uuid,
        /// Provider.
        provider: Provider,
    },

    /// A closing row already exists and the save was not a forced one.
    #[error("Day {0} is already closed")]
    AlreadyClosed(NaiveDate),

    /// Actor role below what closing requires.
    #[error("Role {role} is insufficient, {required} required")]
    InsufficientRole {
        /// The actor's role.
        role: Role,
        /// The minimum role.
        required: Role,
    },

    /// Configured timezone is unknown, or the day has no local midnight.
    #[error("Invalid closing window: {0}")]
    InvalidWindow(String),

    /// Storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ClosingError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::WindowOpen(_) | Self::AlreadyClosed(_) => 409,
            Self::AccountNotFound { .. } => 404,
            Self::InsufficientRole { .. } => 403,
            Self::InvalidWindow(_) => 400,
            Self::Storage(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::WindowOpen(_) => "WINDOW_OPEN",
            Self::AccountNotFound { .. } => "BALANCE_ACCOUNT_NOT_FOUND",
            Self::AlreadyClosed(_) => "ALREADY_CLOSED",
            Self::InsufficientRole { .. } => "INSUFFICIENT_ROLE",
            Self::InvalidWindow(_) => "VALIDATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<AuditError> for ClosingError {
    fn from(err: AuditError) -> Self {
        Self::Storage(err.to_string())
    }
}

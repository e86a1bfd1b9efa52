//! Ledger error types for transition and validation failures.
//!
//! Every failure here aborts the whole unit of work: no transaction write,
//! no balance change, no audit entry, no event.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::AuditError;
use crate::ledger::types::TransactionStatus;
use crate::tenant::Role;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Authorization Errors ==========
    /// Actor kind or tenant does not permit the operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Actor role is below the rank the action requires.
    #[error("Role {role} is insufficient, {required} required")]
    InsufficientRole {
        /// The actor's role.
        role: Role,
        /// The minimum role.
        required: Role,
    },

    /// The initiator tried to decide on their own transaction.
    #[error("Initiator cannot approve or reject their own transaction")]
    SelfApproval,

    // ========== State Errors ==========
    /// Transition is not legal from the current status.
    #[error("Cannot {action} a transaction in status {status}")]
    InvalidState {
        /// Current status.
        status: TransactionStatus,
        /// Attempted action.
        action: &'static str,
    },

    /// Transaction not found in the acting company.
    #[error("Transaction not found: {0}")]
    NotFound(Uuid),

    /// Balance account already opened for this branch and provider.
    #[error("Balance account already exists for this branch and provider")]
    DuplicateAccount,

    // ========== Validation Errors ==========
    /// Bad amount, provider, branch, or account.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The movement would drive the balance negative.
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        /// Current balance.
        available: Decimal,
        /// Amount requested.
        required: Decimal,
    },

    // ========== Concurrency Errors ==========
    /// The status precondition no longer held at commit.
    #[error("Transaction {0} was modified concurrently, please retry")]
    ConcurrentModification(Uuid),

    // ========== Database Errors ==========
    /// Storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InsufficientRole { .. } => "INSUFFICIENT_ROLE",
            Self::SelfApproval => "SELF_APPROVAL_FORBIDDEN",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::NotFound(_) => "TRANSACTION_NOT_FOUND",
            Self::DuplicateAccount => "BALANCE_ACCOUNT_EXISTS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Unauthorized(_) | Self::InsufficientRole { .. } | Self::SelfApproval => 403,
            Self::NotFound(_) => 404,
            Self::InvalidState { .. } | Self::DuplicateAccount | Self::ConcurrentModification(_) => {
                409
            }
            Self::InsufficientBalance { .. } => 422,
            Self::Storage(_) => 500,
        }
    }

    /// Returns true if the caller may retry the whole operation unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}

impl From<AuditError> for LedgerError {
    fn from(err: AuditError) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::SelfApproval.error_code(), "SELF_APPROVAL_FORBIDDEN");
        assert_eq!(
            LedgerError::InvalidState {
                status: TransactionStatus::Rejected,
                action: "approve",
            }
            .error_code(),
            "INVALID_STATE"
        );
        assert_eq!(
            LedgerError::NotFound(Uuid::nil()).error_code(),
            "TRANSACTION_NOT_FOUND"
        );
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(LedgerError::Validation("x".into()).status_code(), 400);
        assert_eq!(
            LedgerError::InsufficientRole {
                role: Role::Teller,
                required: Role::Manager,
            }
            .status_code(),
            403
        );
        assert_eq!(LedgerError::NotFound(Uuid::nil()).status_code(), 404);
        assert_eq!(
            LedgerError::ConcurrentModification(Uuid::nil()).status_code(),
            409
        );
        assert_eq!(
            LedgerError::InsufficientBalance {
                available: Decimal::ZERO,
                required: Decimal::ONE,
            }
            .status_code(),
            422
        );
        assert_eq!(LedgerError::Storage("down".into()).status_code(), 500);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LedgerError::ConcurrentModification(Uuid::nil()).is_retryable());
        assert!(!LedgerError::SelfApproval.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::InvalidState {
            status: TransactionStatus::Reversed,
            action: "reverse",
        };
        assert_eq!(err.to_string(), "Cannot reverse a transaction in status reversed");

        let err = LedgerError::InsufficientBalance {
            available: Decimal::new(1000, 2),
            required: Decimal::new(5000, 2),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance: available 10.00, required 50.00"
        );
    }
}

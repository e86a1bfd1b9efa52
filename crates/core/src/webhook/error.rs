//! Webhook errors.

use thiserror::Error;
use uuid::Uuid;

use crate::audit::AuditError;
use crate::tenant::Role;

/// Errors raised by endpoint management and delivery bookkeeping.
///
/// Delivery attempt failures are not errors here; they are outcomes recorded
/// on the delivery row and never reach the request that caused the event.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Endpoint not found in the acting company.
    #[error("Webhook endpoint not found: {0}")]
    EndpointNotFound(Uuid),

    /// URL or subscription list rejected.
    #[error("Invalid webhook endpoint: {0}")]
    InvalidEndpoint(String),

    /// Actor role below what endpoint management requires.
    #[error("Role {role} is insufficient, {required} required")]
    InsufficientRole {
        /// The actor's role.
        role: Role,
        /// The minimum role.
        required: Role,
    },

    /// Body could not be serialized.
    #[error("Cannot encode webhook body: {0}")]
    Encoding(#[from] serde_json::Error),

    /// HMAC key setup failed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl WebhookError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::EndpointNotFound(_) => 404,
            Self::InvalidEndpoint(_) => 400,
            Self::InsufficientRole { .. } => 403,
            Self::Encoding(_) | Self::Signing(_) | Self::Storage(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::EndpointNotFound(_) => "ENDPOINT_NOT_FOUND",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::InsufficientRole { .. } => "INSUFFICIENT_ROLE",
            Self::Encoding(_) => "ENCODING_ERROR",
            Self::Signing(_) => "SIGNING_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<AuditError> for WebhookError {
    fn from(err: AuditError) -> Self {
        Self::Storage(err.to_string())
    }
}

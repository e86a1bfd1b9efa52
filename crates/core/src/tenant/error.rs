//! Tenant resolution errors.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while resolving the acting tenant.
#[derive(Debug, Error)]
pub enum TenantError {
    /// The caller holds no active membership in the selected company.
    #[error("No active membership in company {0}")]
    Unauthorized(Uuid),

    /// No selector given and the caller belongs to several companies.
    #[error("Caller belongs to {0} companies; select one with X-Company-Id")]
    AmbiguousTenant(usize),

    /// No selector given and the caller belongs to no company.
    #[error("Caller has no active company membership")]
    NoTenant,

    /// Membership lookup failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl TenantError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) | Self::NoTenant => 403,
            Self::AmbiguousTenant(_) => 400,
            Self::Storage(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::AmbiguousTenant(_) => "AMBIGUOUS_TENANT",
            Self::NoTenant => "NO_TENANT",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

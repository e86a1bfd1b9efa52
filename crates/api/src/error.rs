//! HTTP error responses.
//!
//! Every domain error already knows its status and stable code; this module
//! only renders them as `{"error": <code>, "message": <text>}`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use merchant_core::audit::AuditError;
use merchant_core::closing::ClosingError;
use merchant_core::ledger::LedgerError;
use merchant_core::tenant::{Role, TenantError};
use merchant_core::webhook::WebhookError;
use merchant_engine::PublishError;
use merchant_shared::AppError;

/// Error returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Builds an error from a numeric status.
    #[must_use]
    pub fn new(status: u16, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code,
            message: message.into(),
        }
    }

    /// Malformed or invalid request payload.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(400, "VALIDATION_ERROR", message)
    }

    /// Caller's role is below `required`.
    #[must_use]
    pub fn insufficient_role(role: Role, required: Role) -> Self {
        Self::new(
            403,
            "INSUFFICIENT_ROLE",
            format!("Role {role} is insufficient, {required} required"),
        )
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, message = %self.message, "Request failed");
        }
        (
            self.status,
            Json(json!({ "error": self.code, "message": self.message })),
        )
            .into_response()
    }
}

macro_rules! from_domain_error {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for ApiError {
                fn from(err: $ty) -> Self {
                    Self::new(err.status_code(), err.error_code(), err.to_string())
                }
            }
        )+
    };
}

from_domain_error!(
    AppError,
    AuditError,
    ClosingError,
    LedgerError,
    PublishError,
    TenantError,
    WebhookError,
);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<garde::Report> for ApiError {
    fn from(report: garde::Report) -> Self {
        Self::validation(report.to_string())
    }
}

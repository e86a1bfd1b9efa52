//! Tenant resolution for authenticated requests.
//!
//! Runs after `auth_middleware`: the caller's memberships plus the optional
//! `X-Company-Id` selector yield the `TenantContext` every handler receives.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use merchant_core::tenant::{Role, TenantContext};
use merchant_shared::Claims;

/// Header carrying the tenant selector.
pub const COMPANY_HEADER: &str = "x-company-id";

/// Resolves the acting tenant and stores it in request extensions.
pub async fn tenant_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(user_id) = request.extensions().get::<Claims>().map(Claims::user_id) else {
        return ApiError::new(401, "UNAUTHENTICATED", "Authentication required").into_response();
    };
    let selector = match selector(&request) {
        Ok(selector) => selector,
        Err(err) => return err.into_response(),
    };

    match state.tenants.resolve(user_id, selector).await {
        Ok(ctx) => {
            debug!(company_id = %ctx.company_id(), role = %ctx.role(), "Tenant resolved");
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

fn selector(request: &Request) -> Result<Option<Uuid>, ApiError> {
    request
        .headers()
        .get(COMPANY_HEADER)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|s| Uuid::parse_str(s.trim()).ok())
                .ok_or_else(|| ApiError::validation("X-Company-Id must be a UUID"))
        })
        .transpose()
}

/// Extractor for the resolved tenant.
#[derive(Debug, Clone)]
pub struct Tenant(pub TenantContext);

impl Tenant {
    /// Fails with `INSUFFICIENT_ROLE` below `required`.
    pub fn require(&self, required: Role) -> Result<&TenantContext, ApiError> {
        if self.0.role().at_least(required) {
            Ok(&self.0)
        } else {
            Err(ApiError::insufficient_role(self.0.role(), required))
        }
    }
}

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .map(Tenant)
            .ok_or_else(|| ApiError::new(403, "NO_TENANT", "No tenant resolved for this request"))
    }
}

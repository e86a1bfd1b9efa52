//! Audit trail reads (admin only).

use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, middleware::Tenant};
use merchant_core::audit::AuditQuery;
use merchant_core::tenant::Role;
use merchant_shared::PageRequest;

/// Creates the audit routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/audit", get(list_entries))
}

/// Query parameters for reading the audit trail.
#[derive(Debug, Deserialize)]
pub struct AuditEntriesQuery {
    /// Only entries about this entity.
    pub entity_id: Option<Uuid>,
    /// Page size.
    pub limit: Option<u64>,
    /// Rows to skip.
    pub offset: Option<u64>,
}

async fn list_entries(
    State(state): State<AppState>,
    tenant: Tenant,
    Query(query): Query<AuditEntriesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = tenant.require(Role::Admin)?;
    let entries = state
        .audit
        .entries(
            ctx.company_id(),
            AuditQuery {
                entity_id: query.entity_id,
                page: PageRequest {
                    limit: query.limit,
                    offset: query.offset,
                },
            },
        )
        .await?;
    Ok(Json(entries))
}

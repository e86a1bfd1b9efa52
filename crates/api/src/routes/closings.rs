//! Daily closing routes.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::NaiveDate;
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, extractors::ValidJson, middleware::Tenant};
use merchant_core::ledger::Provider;
use merchant_engine::{CloseOutcome, CloseRequest};
use merchant_shared::PageRequest;

/// Creates the closing routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/closings", get(list_closings).post(close_day))
}

/// Query parameters for listing closings.
#[derive(Debug, Deserialize)]
pub struct ListClosingsQuery {
    /// Only this business day.
    pub date: Option<NaiveDate>,
    /// Page size.
    pub limit: Option<u64>,
    /// Rows to skip.
    pub offset: Option<u64>,
}

/// Request body for closing one account's day.
#[derive(Debug, Deserialize, Validate)]
pub struct CloseDayRequest {
    /// Branch of the account.
    #[garde(skip)]
    pub branch_id: Uuid,
    /// Provider of the account.
    #[garde(skip)]
    pub provider: Provider,
    /// Local business day.
    #[garde(skip)]
    pub date: NaiveDate,
    /// Recompute an existing closing.
    #[serde(default)]
    #[garde(skip)]
    pub force: bool,
}

async fn list_closings(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Query(query): Query<ListClosingsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageRequest {
        limit: query.limit,
        offset: query.offset,
    };
    Ok(Json(state.closings.list(&ctx, query.date, page).await?))
}

async fn close_day(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    ValidJson(body): ValidJson<CloseDayRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .closings
        .close_day(
            &ctx,
            CloseRequest {
                branch_id: body.branch_id,
                provider: body.provider,
                date: body.date,
                force: body.force,
            },
        )
        .await?;
    let status = match outcome {
        CloseOutcome::AlreadyClosed(_) => StatusCode::OK,
        CloseOutcome::Closed(_) | CloseOutcome::Recomputed(_) => StatusCode::CREATED,
    };
    Ok((status, Json(outcome)))
}

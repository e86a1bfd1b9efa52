//! Transaction lifecycle routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use garde::Validate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{AppState, error::ApiError, extractors::ValidJson, middleware::Tenant};
use merchant_core::ledger::{
    Channel, Direction, NewTransaction, Provider, TransactionFilter, TransactionStatus,
};
use merchant_shared::PageRequest;

/// Creates the transaction routes (auth and tenant middleware applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/transactions",
            get(list_transactions).post(create_transaction),
        )
        .route("/transactions/{id}", get(get_transaction))
        .route("/transactions/{id}/approve", post(approve_transaction))
        .route("/transactions/{id}/reject", post(reject_transaction))
        .route("/transactions/{id}/complete", post(complete_transaction))
        .route("/transactions/{id}/reverse", post(reverse_transaction))
        .route("/transactions/{id}/fail", post(fail_transaction))
        .route("/transactions/{id}/reversal", get(get_reversal))
}

// ============================================================================
// Request Types
// ============================================================================

/// Query parameters for listing transactions.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Filter by status.
    pub status: Option<TransactionStatus>,
    /// Filter by channel.
    pub channel: Option<Channel>,
    /// Filter by branch.
    pub branch_id: Option<Uuid>,
    /// Page size.
    pub limit: Option<u64>,
    /// Rows to skip.
    pub offset: Option<u64>,
}

/// Request body for recording a transaction.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTransactionRequest {
    /// Branch the money moves through.
    #[garde(skip)]
    pub branch_id: Uuid,
    /// Channel.
    #[garde(skip)]
    pub channel: Channel,
    /// Direction.
    #[garde(skip)]
    pub direction: Direction,
    /// Provider; must belong to the channel.
    #[garde(skip)]
    pub provider: Provider,
    /// Positive amount, at most two decimal places.
    #[garde(custom(positive_money))]
    pub amount: Decimal,
    /// Customer reference.
    #[garde(length(min = 1, max = 100))]
    pub customer_ref: Option<String>,
    /// Free-text description.
    #[garde(length(max = 500))]
    pub description: Option<String>,
}

impl From<CreateTransactionRequest> for NewTransaction {
    fn from(req: CreateTransactionRequest) -> Self {
        Self {
            branch_id: req.branch_id,
            channel: req.channel,
            direction: req.direction,
            provider: req.provider,
            amount: req.amount,
            customer_ref: req.customer_ref,
            description: req.description,
        }
    }
}

/// Optional reason for reject, reverse, and fail.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReasonRequest {
    /// Free-text reason.
    #[garde(length(max = 500))]
    pub reason: Option<String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn positive_money(value: &Decimal, _ctx: &()) -> garde::Result {
    if *value <= Decimal::ZERO {
        return Err(garde::Error::new("must be greater than zero"));
    }
    if value.normalize().scale() > 2 {
        return Err(garde::Error::new("must have at most two decimal places"));
    }
    Ok(())
}

fn reason(body: Option<Json<ReasonRequest>>) -> Result<Option<String>, ApiError> {
    let Some(Json(body)) = body else {
        return Ok(None);
    };
    body.validate()?;
    Ok(body.reason)
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_transactions(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = TransactionFilter {
        status: query.status,
        channel: query.channel,
        branch_id: query.branch_id,
        page: PageRequest {
            limit: query.limit,
            offset: query.offset,
        },
    };
    let transactions = state.ledger.list(&ctx, filter).await?;
    Ok(Json(transactions))
}

async fn create_transaction(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    ValidJson(body): ValidJson<CreateTransactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tx = state.ledger.create(&ctx, body.into()).await?;
    info!(transaction_id = %tx.id, status = %tx.status, "Transaction recorded via API");
    Ok((StatusCode::CREATED, Json(tx)))
}

async fn get_transaction(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.ledger.get(&ctx, id).await?))
}

async fn approve_transaction(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.ledger.approve(&ctx, id).await?))
}

async fn reject_transaction(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(id): Path<Uuid>,
    body: Option<Json<ReasonRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let reason = reason(body)?;
    Ok(Json(state.ledger.reject(&ctx, id, reason).await?))
}

async fn complete_transaction(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.ledger.complete(&ctx, id).await?))
}

async fn reverse_transaction(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(id): Path<Uuid>,
    body: Option<Json<ReasonRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let reason = reason(body)?;
    Ok(Json(state.ledger.reverse(&ctx, id, reason).await?))
}

async fn fail_transaction(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(id): Path<Uuid>,
    body: Option<Json<ReasonRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let reason = reason(body)?;
    Ok(Json(state.ledger.fail(&ctx, id, reason).await?))
}

async fn get_reversal(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .ledger
        .reversal(&ctx, id)
        .await?
        .ok_or_else(|| ApiError::new(404, "REVERSAL_NOT_FOUND", "Transaction was not reversed"))?;
    Ok(Json(record))
}

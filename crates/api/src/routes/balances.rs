//! Balance account routes.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use garde::Validate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, extractors::ValidJson, middleware::Tenant};
use merchant_core::ledger::Provider;
use merchant_engine::NewBalance;

/// Creates the balance routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/balances", get(list_balances).post(open_balance))
}

/// Request body for opening a balance account.
#[derive(Debug, Deserialize, Validate)]
pub struct OpenBalanceRequest {
    /// Branch of the account.
    #[garde(skip)]
    pub branch_id: Uuid,
    /// Provider of the account.
    #[garde(skip)]
    pub provider: Provider,
    /// Opening float.
    #[garde(custom(non_negative))]
    pub starting_balance: Decimal,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn non_negative(value: &Decimal, _ctx: &()) -> garde::Result {
    if value.is_sign_negative() && !value.is_zero() {
        Err(garde::Error::new("must not be negative"))
    } else {
        Ok(())
    }
}

async fn list_balances(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.ledger.balances(&ctx).await?))
}

async fn open_balance(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    ValidJson(body): ValidJson<OpenBalanceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let balance = state
        .ledger
        .open_balance(
            &ctx,
            NewBalance {
                branch_id: body.branch_id,
                provider: body.provider,
                starting_balance: body.starting_balance,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(balance)))
}

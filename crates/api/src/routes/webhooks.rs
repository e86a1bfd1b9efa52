//! Webhook endpoint management routes (admin only).

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError, extractors::ValidJson, middleware::Tenant};
use merchant_core::events::EventType;
use merchant_core::webhook::{EndpointUpdate, NewEndpoint, WebhookEndpoint};
use merchant_shared::PageRequest;

/// Creates the webhook routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks", get(list_endpoints).post(create_endpoint))
        .route("/webhooks/{id}", patch(update_endpoint))
        .route("/webhooks/{id}/deliveries", get(list_deliveries))
}

/// Request body for registering an endpoint.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateEndpointRequest {
    /// Receiver URL.
    #[garde(url, length(max = 2048))]
    pub url: String,
    /// Subscribed event types; empty means all.
    #[serde(default)]
    #[garde(skip)]
    pub events: Vec<EventType>,
}

/// Request body for changing an endpoint.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEndpointRequest {
    /// New receiver URL.
    #[garde(url, length(max = 2048))]
    pub url: Option<String>,
    /// New subscription list.
    #[garde(skip)]
    pub events: Option<Vec<EventType>>,
    /// Enable or disable deliveries.
    #[garde(skip)]
    pub is_active: Option<bool>,
}

/// Query parameters for listing deliveries.
#[derive(Debug, Deserialize)]
pub struct DeliveriesQuery {
    /// Page size.
    pub limit: Option<u64>,
    /// Rows to skip.
    pub offset: Option<u64>,
}

/// Creation response; the only place the secret is ever returned.
#[derive(Debug, Serialize)]
pub struct CreatedEndpointResponse {
    /// The stored endpoint.
    #[serde(flatten)]
    pub endpoint: WebhookEndpoint,
    /// HMAC signing secret.
    pub secret: String,
}

async fn list_endpoints(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.webhooks.list(&ctx).await?))
}

async fn create_endpoint(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    ValidJson(body): ValidJson<CreateEndpointRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let endpoint = state
        .webhooks
        .create(
            &ctx,
            NewEndpoint {
                url: body.url,
                events: body.events,
            },
        )
        .await?;
    let secret = endpoint.secret.clone();
    Ok((
        StatusCode::CREATED,
        Json(CreatedEndpointResponse { endpoint, secret }),
    ))
}

async fn update_endpoint(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(id): Path<Uuid>,
    ValidJson(body): ValidJson<UpdateEndpointRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let update = EndpointUpdate {
        url: body.url,
        events: body.events,
        is_active: body.is_active,
    };
    Ok(Json(state.webhooks.update(&ctx, id, update).await?))
}

async fn list_deliveries(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(id): Path<Uuid>,
    Query(query): Query<DeliveriesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageRequest {
        limit: query.limit,
        offset: query.offset,
    };
    Ok(Json(state.webhooks.deliveries(&ctx, id, page).await?))
}

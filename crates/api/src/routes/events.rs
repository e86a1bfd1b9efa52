//! External event publication.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use garde::Validate;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{AppState, error::ApiError, extractors::ValidJson, middleware::Tenant};
use merchant_core::events::EventType;

/// Creates the event routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/events", post(publish_event))
}

/// Request body for publishing a `customer.*` event.
#[derive(Debug, Deserialize, Validate)]
pub struct PublishEventRequest {
    /// Event type.
    #[garde(skip)]
    pub event_type: EventType,
    /// Entity the event is about.
    #[garde(skip)]
    pub entity_id: Uuid,
    /// Event payload.
    #[serde(default)]
    #[garde(skip)]
    pub data: Value,
}

async fn publish_event(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    ValidJson(body): ValidJson<PublishEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state
        .publisher
        .publish_external(&ctx, body.event_type, body.entity_id, body.data)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(event)))
}

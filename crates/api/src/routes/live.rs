//! Live dashboard WebSocket.
//!
//! Browsers cannot set headers on a WebSocket handshake, so the token and
//! tenant selector travel as `access_token` and `company_id` query
//! parameters. Only admins may subscribe.

use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{AppState, error::ApiError};
use merchant_core::events::DomainEvent;
use merchant_core::tenant::{Role, TenantContext};
use merchant_engine::LiveSubscription;

/// Creates the live route.
pub fn routes() -> Router<AppState> {
    Router::new().route("/live", get(live_socket))
}

/// Handshake query parameters.
#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    /// Bearer token.
    pub access_token: Option<String>,
    /// Tenant selector.
    pub company_id: Option<Uuid>,
}

/// Client to server frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    RefreshBalances,
}

async fn live_socket(
    State(state): State<AppState>,
    Query(query): Query<LiveQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ctx = match authorize(&state, query).await {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };
    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, ctx))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn authorize(state: &AppState, query: LiveQuery) -> Result<TenantContext, ApiError> {
    let token = query
        .access_token
        .ok_or_else(|| ApiError::new(401, "MISSING_TOKEN", "access_token is required"))?;
    let claims = state
        .jwt_service
        .validate_token(&token)
        .map_err(|_| ApiError::new(401, "INVALID_TOKEN", "Invalid or malformed token"))?;
    let ctx = state.tenants.resolve(claims.user_id(), query.company_id).await?;
    if !ctx.role().at_least(Role::Admin) {
        return Err(ApiError::insufficient_role(ctx.role(), Role::Admin));
    }
    Ok(ctx)
}

async fn handle_socket(socket: WebSocket, state: AppState, ctx: TenantContext) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.live.subscribe(ctx.company_id());
    info!(
        company_id = %ctx.company_id(),
        topic = %subscription.topic(),
        "Live session opened"
    );

    let initial = match balances(&state, &ctx).await {
        Ok(balances) => json!({ "type": "initial_state", "data": { "balances": balances } }),
        Err(err) => error_frame(&err),
    };
    if send(&mut sender, &initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let frame = event_frame(&subscription, &event);
                if send(&mut sender, &frame).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientFrame>(text.as_str()) {
                            Ok(ClientFrame::RefreshBalances) => match balances(&state, &ctx).await {
                                Ok(balances) => json!({ "type": "balances", "data": balances }),
                                Err(err) => error_frame(&err),
                            },
                            Err(_) => {
                                debug!(company_id = %ctx.company_id(), "Unknown live frame ignored");
                                continue;
                            }
                        };
                        if send(&mut sender, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(company_id = %ctx.company_id(), error = %e, "Live socket error");
                        break;
                    }
                }
            }
        }
    }

    info!(company_id = %ctx.company_id(), "Live session closed");
}

async fn balances(state: &AppState, ctx: &TenantContext) -> Result<Value, ApiError> {
    let balances = state.ledger.balances(ctx).await?;
    serde_json::to_value(balances)
        .map_err(|e| ApiError::new(500, "ENCODING_ERROR", e.to_string()))
}

fn event_frame(subscription: &LiveSubscription, event: &DomainEvent) -> Value {
    json!({ "type": "event", "topic": subscription.topic(), "data": event })
}

fn error_frame(err: &ApiError) -> Value {
    json!({ "type": "error", "error": err.code() })
}

async fn send<S>(sender: &mut S, frame: &Value) -> Result<(), S::Error>
where
    S: futures::Sink<Message> + Unpin,
{
    sender.send(Message::Text(frame.to_string().into())).await
}

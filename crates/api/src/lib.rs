//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - JSON routes over the ledger, closings, webhooks, events, and audit log
//! - Authentication and tenant-resolution middleware
//! - The live dashboard WebSocket
//! - Error rendering for every domain error

pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::http::header::AUTHORIZATION;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

use merchant_core::audit::AuditLog;
use merchant_engine::{
    ClosingAggregator, EventPublisher, LedgerEngine, LiveGateway, TenantContextResolver,
    WebhookEndpoints,
};
use merchant_shared::JwtService;

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// JWT service for token validation.
    pub jwt_service: Arc<JwtService>,
    /// Caller to tenant resolution.
    pub tenants: Arc<TenantContextResolver>,
    /// Transaction lifecycle.
    pub ledger: Arc<LedgerEngine>,
    /// Daily closings.
    pub closings: Arc<ClosingAggregator>,
    /// Webhook endpoint management.
    pub webhooks: WebhookEndpoints,
    /// External event entry point.
    pub publisher: EventPublisher,
    /// Audit trail reads.
    pub audit: Arc<dyn AuditLog>,
    /// Live dashboard sessions.
    pub live: Arc<LiveGateway>,
}

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(SetSensitiveRequestHeadersLayer::new([AUTHORIZATION]))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

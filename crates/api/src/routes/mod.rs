//! API route definitions.

use axum::{Router, middleware};

use crate::{
    AppState,
    middleware::{auth_middleware, tenant_middleware},
};

pub mod audit;
pub mod balances;
pub mod closings;
pub mod events;
pub mod health;
pub mod live;
pub mod transactions;
pub mod webhooks;

/// Creates the API router; everything but health and the live socket needs
/// a bearer token and a resolvable tenant.
#[allow(clippy::needless_pass_by_value)]
pub fn api_routes_with_state(state: AppState) -> Router<AppState> {
    // Layers run outermost first: auth, then tenant.
    let protected_routes = Router::new()
        .merge(transactions::routes())
        .merge(balances::routes())
        .merge(closings::routes())
        .merge(webhooks::routes())
        .merge(events::routes())
        .merge(audit::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            tenant_middleware,
        ))
        .layer(middleware::from_fn_with_state(state, auth_middleware));

    // The socket authenticates from query parameters.
    Router::new()
        .merge(health::routes())
        .merge(live::routes())
        .merge(protected_routes)
}

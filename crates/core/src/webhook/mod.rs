//! Signed, retried webhook delivery.
//!
//! # Modules
//!
//! - `endpoint` - Registered receivers and their failure streaks
//! - `delivery` - Queued deliveries and the attempt state machine
//! - `backoff` - Exponential retry schedule
//! - `signature` - HMAC-SHA256 body signing
//! - `error` - Management and bookkeeping failures
//! - `store` - Durable queue port with claim/lease

pub mod backoff;
pub mod delivery;
pub mod endpoint;
pub mod error;
pub mod signature;
pub mod store;

#[cfg(test)]
mod backoff_props;
#[cfg(test)]
mod signature_props;

pub use backoff::BackoffPolicy;
pub use delivery::{
    AttemptOutcome, ClaimedDelivery, DeliveryService, DeliveryStatus, WebhookDelivery,
};
pub use endpoint::{EndpointHealth, EndpointService, EndpointUpdate, NewEndpoint, WebhookEndpoint};
pub use error::WebhookError;
pub use signature::WebhookSigner;
pub use store::{AttemptRecord, WebhookStore};

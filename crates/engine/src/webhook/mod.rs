//! Webhook fan-out, delivery workers, and endpoint management.
//!
//! # Modules
//!
//! - `fanout` - Outbox relay queuing deliveries for subscribed endpoints
//! - `dispatcher` - Claim/lease workers performing signed attempts
//! - `transport` - HTTP transport and request headers
//! - `endpoints` - Admin endpoint management

pub mod dispatcher;
pub mod endpoints;
pub mod fanout;
pub mod transport;

pub use dispatcher::{DispatchSummary, WebhookDispatcher};
pub use endpoints::WebhookEndpoints;
pub use fanout::WebhookFanout;
pub use transport::{ReqwestTransport, WebhookRequest, WebhookTransport};

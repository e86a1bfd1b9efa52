//! Async orchestration for MerchantPlus.
//!
//! This crate drives the pure rules of `merchant-core` against the storage
//! ports: it commits transitions, publishes events after commit, runs the
//! webhook and closing background workers, and fans events out to live
//! dashboard sessions.
//!
//! # Modules
//!
//! - `ledger` - `LedgerEngine`, the transaction lifecycle end to end
//! - `bus` - After-commit event bus and the sink trait
//! - `publisher` - External (`customer.*`) event entry point
//! - `webhook` - Delivery fan-out, dispatcher workers, endpoint management
//! - `live` - Per-company live session registry
//! - `closing` - Daily closing aggregator and scheduler
//! - `tenant` - Tenant resolution and the membership cache
//! - `memory` - In-memory store implementing every port

pub mod bus;
pub mod closing;
pub mod ledger;
pub mod live;
pub mod memory;
pub mod publisher;
pub mod tenant;
pub mod webhook;

pub use bus::{EventBus, EventSink, SinkError};
pub use closing::{CloseOutcome, CloseRequest, CloseSummary, ClosingAggregator};
pub use ledger::{LedgerEngine, NewBalance};
pub use live::{LiveGateway, LiveSubscription};
pub use memory::MemoryStore;
pub use publisher::{EventPublisher, PublishError};
pub use tenant::{CachedTenantDirectory, TenantContextResolver};
pub use webhook::{
    DispatchSummary, ReqwestTransport, WebhookDispatcher, WebhookEndpoints, WebhookFanout,
    WebhookRequest, WebhookTransport,
};

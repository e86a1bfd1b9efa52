//! Durable delivery queue, event outbox, and endpoint registry port.
//!
//! Every announced event is first written to the outbox, inside the commit
//! that caused it. Fan-out turns an outbox event into deliveries and marks it
//! handled in one step, so an event is fanned out at most once and stays in
//! the outbox until that happens.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use merchant_shared::PageRequest;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::events::DomainEvent;
use crate::webhook::delivery::{ClaimedDelivery, WebhookDelivery};
use crate::webhook::endpoint::WebhookEndpoint;
use crate::webhook::error::WebhookError;

/// Result of one attempt as written back by a worker.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// Token from the claim; the write is dropped if the lease moved on.
    pub claim_token: Uuid,
    /// New delivery state.
    pub delivery: WebhookDelivery,
    /// `Some(true)` resets the endpoint's failure streak, `Some(false)`
    /// extends it, `None` leaves the endpoint untouched.
    pub endpoint_success: Option<bool>,
    /// Streak length that deactivates the endpoint.
    pub disable_after: u32,
}

/// Persistence for endpoints and deliveries.
///
/// Endpoint and delivery listings are tenant-scoped; claiming is a system
/// operation spanning every company.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Endpoints of a company.
    async fn endpoints(&self, company_id: Uuid) -> Result<Vec<WebhookEndpoint>, WebhookError>;

    /// One endpoint of a company.
    async fn endpoint(
        &self,
        company_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<Option<WebhookEndpoint>, WebhookError>;

    /// Insert an endpoint with its audit entry.
    async fn create_endpoint(
        &self,
        endpoint: WebhookEndpoint,
        audit: AuditEntry,
    ) -> Result<WebhookEndpoint, WebhookError>;

    /// Replace an endpoint's mutable fields with its audit entry.
    async fn update_endpoint(
        &self,
        endpoint: WebhookEndpoint,
        audit: AuditEntry,
    ) -> Result<WebhookEndpoint, WebhookError>;

    /// Write an event raised outside a ledger commit to the outbox.
    async fn record_event(&self, event: &DomainEvent) -> Result<(), WebhookError>;

    /// Outbox events not yet fanned out that occurred before `before`,
    /// oldest first.
    async fn pending_events(
        &self,
        before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DomainEvent>, WebhookError>;

    /// Queue the deliveries for an event and mark it fanned out.
    ///
    /// Returns `false` without queuing anything if the event was already
    /// fanned out. An event missing from the outbox is recorded as handled.
    async fn fan_out(
        &self,
        event: &DomainEvent,
        deliveries: Vec<WebhookDelivery>,
    ) -> Result<bool, WebhookError>;

    /// Lease up to `limit` due deliveries, oldest due first.
    ///
    /// A delivery is due when it is pending or failed, its `next_attempt_at`
    /// has passed, and no unexpired lease holds it. Two concurrent callers
    /// never receive the same delivery.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: u32,
    ) -> Result<Vec<ClaimedDelivery>, WebhookError>;

    /// Write back an attempt and release the lease.
    ///
    /// Returns `false` without writing if the claim token no longer matches.
    async fn record_attempt(&self, record: AttemptRecord) -> Result<bool, WebhookError>;

    /// Deliveries of one endpoint, newest first.
    async fn deliveries(
        &self,
        company_id: Uuid,
        endpoint_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<WebhookDelivery>, WebhookError>;
}

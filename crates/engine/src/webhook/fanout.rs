//! Outbox relay turning events into queued webhook deliveries.
//!
//! The bus hands each committed event to `WebhookFanout` right away. Events
//! the bus could not hand over (sink failures, a restart between commit and
//! fan-out) stay in the outbox and are picked up by the periodic sweep.
//! Fanning out twice is harmless: the store acknowledges an event once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use merchant_core::events::DomainEvent;
use merchant_core::webhook::{DeliveryService, WebhookError, WebhookStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{EventSink, SinkError};

/// Queues one delivery per active endpoint subscribed to an event.
pub struct WebhookFanout {
    store: Arc<dyn WebhookStore>,
}

impl WebhookFanout {
    /// Creates the relay.
    #[must_use]
    pub const fn new(store: Arc<dyn WebhookStore>) -> Self {
        Self { store }
    }

    /// Queue deliveries for one event and acknowledge it in the outbox.
    ///
    /// Returns the number of deliveries queued; 0 if the event had already
    /// been fanned out.
    pub async fn fan_out(&self, event: &DomainEvent) -> Result<usize, WebhookError> {
        let now = Utc::now();
        let deliveries = self
            .store
            .endpoints(event.company_id)
            .await?
            .iter()
            .filter(|endpoint| endpoint.subscribes_to(event.event_type))
            .map(|endpoint| DeliveryService::enqueue(endpoint, event, now))
            .collect::<Result<Vec<_>, _>>()?;

        let count = deliveries.len();
        if !self.store.fan_out(event, deliveries).await? {
            return Ok(0);
        }
        if count > 0 {
            debug!(
                company_id = %event.company_id,
                event_type = %event.event_type,
                count,
                "Webhook deliveries queued"
            );
        }
        Ok(count)
    }

    /// Fan out outbox events that occurred before `before` and are still
    /// unacknowledged. Returns how many events were handled.
    pub async fn sweep(&self, before: DateTime<Utc>, limit: u32) -> Result<usize, WebhookError> {
        let pending = self.store.pending_events(before, limit).await?;
        let mut handled = 0;
        for event in &pending {
            match self.fan_out(event).await {
                Ok(_) => handled += 1,
                Err(err) => warn!(
                    event_id = %event.id,
                    company_id = %event.company_id,
                    error = %err,
                    "Outbox event still pending"
                ),
            }
        }
        if handled > 0 {
            info!(count = handled, "Outbox events fanned out by sweep");
        }
        Ok(handled)
    }

    /// Sweep every `interval` until `cancel` fires. Only events older than
    /// one interval are swept, leaving fresh ones to the bus.
    pub async fn run(self: Arc<Self>, interval: Duration, limit: u32, cancel: CancellationToken) {
        let interval = interval.max(Duration::from_millis(1));
        let age = chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero());
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(err) = self.sweep(Utc::now() - age, limit).await {
                error!(error = %err, "Outbox sweep failed");
            }
        }
        info!("Outbox sweep stopped");
    }
}

#[async_trait]
impl EventSink for WebhookFanout {
    fn name(&self) -> &'static str {
        "webhooks"
    }

    async fn deliver(&self, event: &DomainEvent) -> Result<(), SinkError> {
        self.fan_out(event).await?;
        Ok(())
    }
}

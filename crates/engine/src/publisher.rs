//! Entry point for events raised outside the ledger.
//!
//! Customer lifecycle lives in the CRUD layer; it reports `customer.*`
//! events here so they reach webhooks and live dashboards like ledger events.
//! The event is written to the outbox before it is published.

use std::sync::Arc;

use chrono::Utc;
use merchant_core::events::{DomainEvent, EventType};
use merchant_core::tenant::{Role, TenantContext};
use merchant_core::webhook::{WebhookError, WebhookStore};
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::bus::EventBus;

/// Errors raised when publishing an external event.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Actor role below manager.
    #[error("Role {role} is insufficient, {required} required")]
    InsufficientRole {
        /// The actor's role.
        role: Role,
        /// The minimum role.
        required: Role,
    },

    /// Only customer events may be published from outside the ledger.
    #[error("Event type {0} cannot be published externally")]
    UnsupportedEvent(EventType),

    /// The outbox write failed.
    #[error("Cannot record event: {0}")]
    Outbox(#[from] WebhookError),
}

impl PublishError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InsufficientRole { .. } => 403,
            Self::UnsupportedEvent(_) => 400,
            Self::Outbox(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientRole { .. } => "INSUFFICIENT_ROLE",
            Self::UnsupportedEvent(_) => "VALIDATION_ERROR",
            Self::Outbox(_) => "STORAGE_ERROR",
        }
    }
}

/// Publishes externally raised events on the bus.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<EventBus>,
    outbox: Arc<dyn WebhookStore>,
}

impl EventPublisher {
    /// Creates a publisher over a bus and the outbox it records into.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, outbox: Arc<dyn WebhookStore>) -> Self {
        Self { bus, outbox }
    }

    /// Publish a `customer.*` event for the caller's company.
    pub async fn publish_external(
        &self,
        ctx: &TenantContext,
        event_type: EventType,
        entity_id: Uuid,
        data: Value,
    ) -> Result<DomainEvent, PublishError> {
        if !ctx.role().at_least(Role::Manager) {
            return Err(PublishError::InsufficientRole {
                role: ctx.role(),
                required: Role::Manager,
            });
        }
        if !event_type.is_customer() {
            return Err(PublishError::UnsupportedEvent(event_type));
        }

        let event = DomainEvent::new(event_type, ctx.company_id(), entity_id, data, Utc::now());
        self.outbox.record_event(&event).await?;
        info!(
            company_id = %ctx.company_id(),
            event_type = %event_type,
            entity_id = %entity_id,
            "External event published"
        );
        self.bus.publish(event.clone());
        Ok(event)
    }
}

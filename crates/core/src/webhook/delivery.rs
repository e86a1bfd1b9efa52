//! Delivery records and their state machine.
//!
//! A delivery is `pending` until its first attempt, `failed` while retries
//! remain, and ends `delivered` or `exhausted`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::events::{DomainEvent, EventType};
use crate::webhook::backoff::BackoffPolicy;
use crate::webhook::endpoint::WebhookEndpoint;
use crate::webhook::error::WebhookError;

/// Delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Not attempted yet.
    Pending,
    /// Delivered with a 2xx (terminal).
    Delivered,
    /// Last attempt failed; a retry is scheduled.
    Failed,
    /// Attempt budget spent or endpoint disabled (terminal).
    Exhausted,
}

impl DeliveryStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Exhausted => "exhausted",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            "exhausted" => Some(Self::Exhausted),
            _ => None,
        }
    }

    /// Returns true once no further attempt will be made.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Exhausted)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event queued for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookDelivery {
    /// Delivery ID; also the idempotency key.
    pub id: Uuid,
    /// Owning company.
    pub company_id: Uuid,
    /// Target endpoint.
    pub endpoint_id: Uuid,
    /// Event type.
    pub event_type: EventType,
    /// Entity the event is about.
    pub entity_id: Uuid,
    /// Exact body bytes sent on every attempt.
    pub payload: String,
    /// Attempts made.
    pub attempts: u32,
    /// Status.
    pub status: DeliveryStatus,
    /// Earliest time of the next attempt.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Last failure.
    pub last_error: Option<String>,
    /// Last HTTP status received.
    pub last_status_code: Option<u16>,
    /// Success time.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// A delivery leased to one worker.
#[derive(Debug, Clone)]
pub struct ClaimedDelivery {
    /// The delivery.
    pub delivery: WebhookDelivery,
    /// The target endpoint as of claim time.
    pub endpoint: WebhookEndpoint,
    /// Lease token; the attempt is recorded only while it still matches.
    pub claim_token: Uuid,
}

/// Result of one HTTP attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx received.
    Delivered {
        /// Status received.
        status_code: u16,
    },
    /// Non-2xx received.
    Rejected {
        /// Status received.
        status_code: u16,
        /// Truncated response body.
        body: String,
    },
    /// No response: connect error, timeout, or similar.
    Transport(String),
    /// Endpoint was inactive at claim time; no request was made.
    EndpointDisabled,
}

impl AttemptOutcome {
    /// Returns true for a 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Whether this outcome counts against the endpoint's failure streak.
    #[must_use]
    pub fn counts_as_attempt(&self) -> bool {
        !matches!(self, Self::EndpointDisabled)
    }
}

/// Largest response body excerpt kept in `last_error`.
const ERROR_EXCERPT: usize = 200;

/// Stateless delivery rules.
pub struct DeliveryService;

impl DeliveryService {
    /// Queue an event for an endpoint, serializing the body once.
    ///
    /// # Errors
    /// * `WebhookError::Encoding` if the event cannot be serialized
    pub fn enqueue(
        endpoint: &WebhookEndpoint,
        event: &DomainEvent,
        now: DateTime<Utc>,
    ) -> Result<WebhookDelivery, WebhookError> {
        Ok(WebhookDelivery {
            id: Uuid::new_v4(),
            company_id: endpoint.company_id,
            endpoint_id: endpoint.id,
            event_type: event.event_type,
            entity_id: event.entity_id,
            payload: event.to_body()?,
            attempts: 0,
            status: DeliveryStatus::Pending,
            next_attempt_at: Some(now),
            last_error: None,
            last_status_code: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply one attempt's outcome and schedule the next one.
    #[must_use]
    pub fn apply_attempt(
        delivery: &WebhookDelivery,
        outcome: &AttemptOutcome,
        policy: &BackoffPolicy,
        now: DateTime<Utc>,
    ) -> WebhookDelivery {
        let mut next = delivery.clone();
        next.updated_at = now;

        if outcome.counts_as_attempt() {
            next.attempts = delivery.attempts.saturating_add(1);
        }

        match outcome {
            AttemptOutcome::Delivered { status_code } => {
                next.status = DeliveryStatus::Delivered;
                next.last_status_code = Some(*status_code);
                next.delivered_at = Some(now);
                next.next_attempt_at = None;
                return next;
            }
            AttemptOutcome::Rejected { status_code, body } => {
                next.last_status_code = Some(*status_code);
                let excerpt: String = body.chars().take(ERROR_EXCERPT).collect();
                next.last_error = Some(format!("HTTP {status_code}: {excerpt}"));
            }
            AttemptOutcome::Transport(error) => {
                next.last_error = Some(error.clone());
            }
            AttemptOutcome::EndpointDisabled => {
                next.status = DeliveryStatus::Exhausted;
                next.last_error = Some("endpoint disabled".to_string());
                next.next_attempt_at = None;
                return next;
            }
        }

        match policy.next_retry(next.attempts, now) {
            Some(at) => {
                next.status = DeliveryStatus::Failed;
                next.next_attempt_at = Some(at);
            }
            None => {
                next.status = DeliveryStatus::Exhausted;
                next.next_attempt_at = None;
            }
        }
        next
    }
}

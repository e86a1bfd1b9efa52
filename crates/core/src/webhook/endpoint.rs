//! Tenant-registered webhook endpoints.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use uuid::Uuid;

use crate::events::EventType;
use crate::webhook::error::WebhookError;

/// A company's registered receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookEndpoint {
    /// Endpoint ID.
    pub id: Uuid,
    /// Owning company.
    pub company_id: Uuid,
    /// Receiver URL.
    pub url: String,
    /// Shared HMAC secret; shown once at creation.
    #[serde(skip_serializing)]
    pub secret: String,
    /// Subscribed event types; empty means all.
    pub events: Vec<EventType>,
    /// Whether deliveries are attempted.
    pub is_active: bool,
    /// Consecutive failed attempts.
    pub failure_count: u32,
    /// Last attempt time.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Last change time.
    pub updated_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    /// Whether this endpoint should receive `event`.
    #[must_use]
    pub fn subscribes_to(&self, event: EventType) -> bool {
        self.is_active && (self.events.is_empty() || self.events.contains(&event))
    }
}

/// Registration payload.
#[derive(Debug, Clone)]
pub struct NewEndpoint {
    /// Receiver URL.
    pub url: String,
    /// Subscribed event types.
    pub events: Vec<EventType>,
}

/// Partial update payload.
#[derive(Debug, Clone, Default)]
pub struct EndpointUpdate {
    /// New URL.
    pub url: Option<String>,
    /// New subscription list.
    pub events: Option<Vec<EventType>>,
    /// Enable or disable.
    pub is_active: Option<bool>,
}

/// Failure bookkeeping after one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointHealth {
    /// Consecutive failures after the attempt.
    pub failure_count: u32,
    /// Whether the endpoint stays active.
    pub is_active: bool,
}

/// Stateless rules for endpoint management.
pub struct EndpointService;

impl EndpointService {
    /// A fresh 32-byte secret, hex-encoded.
    #[must_use]
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Accept only absolute http(s) URLs with a host.
    ///
    /// # Errors
    /// * `WebhookError::InvalidEndpoint` otherwise
    pub fn validate_url(url: &str) -> Result<(), WebhookError> {
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .ok_or_else(|| WebhookError::InvalidEndpoint(format!("{url} is not http(s)")))?;
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if host.is_empty() || url.chars().any(char::is_whitespace) || url.len() > 500 {
            return Err(WebhookError::InvalidEndpoint(format!("{url} is not a valid URL")));
        }
        Ok(())
    }

    /// Build a new endpoint with a generated secret.
    ///
    /// # Errors
    /// * `WebhookError::InvalidEndpoint` for a bad URL
    pub fn create(
        company_id: Uuid,
        input: NewEndpoint,
        now: DateTime<Utc>,
    ) -> Result<WebhookEndpoint, WebhookError> {
        Self::validate_url(&input.url)?;
        Ok(WebhookEndpoint {
            id: Uuid::new_v4(),
            company_id,
            url: input.url,
            secret: Self::generate_secret(),
            events: Self::unique(input.events),
            is_active: true,
            failure_count: 0,
            last_attempt_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply an update. Re-enabling clears the failure streak.
    ///
    /// # Errors
    /// * `WebhookError::InvalidEndpoint` for a bad URL
    pub fn apply_update(
        endpoint: &WebhookEndpoint,
        update: EndpointUpdate,
        now: DateTime<Utc>,
    ) -> Result<WebhookEndpoint, WebhookError> {
        let mut next = endpoint.clone();
        if let Some(url) = update.url {
            Self::validate_url(&url)?;
            next.url = url;
        }
        if let Some(events) = update.events {
            next.events = Self::unique(events);
        }
        if let Some(active) = update.is_active {
            if active && !endpoint.is_active {
                next.failure_count = 0;
            }
            next.is_active = active;
        }
        next.updated_at = now;
        Ok(next)
    }

    /// Health after an attempt: success resets the streak, and reaching
    /// `disable_after` consecutive failures deactivates the endpoint.
    #[must_use]
    pub fn after_attempt(
        current: EndpointHealth,
        succeeded: bool,
        disable_after: u32,
    ) -> EndpointHealth {
        if succeeded {
            return EndpointHealth {
                failure_count: 0,
                is_active: current.is_active,
            };
        }
        let failure_count = current.failure_count.saturating_add(1);
        EndpointHealth {
            failure_count,
            is_active: current.is_active && failure_count < disable_after,
        }
    }

    fn unique(events: Vec<EventType>) -> Vec<EventType> {
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            if !out.contains(&event) {
                out.push(event);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn endpoint(events: Vec<EventType>) -> WebhookEndpoint {
        EndpointService::create(
            Uuid::new_v4(),
            NewEndpoint {
                url: "https://hooks.example.com/merchant".into(),
                events,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_secret_is_32_bytes_hex() {
        let secret = EndpointService::generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, EndpointService::generate_secret());
    }

    #[rstest]
    #[case("https://example.com/hook", true)]
    #[case("http://localhost:9000", true)]
    #[case("ftp://example.com", false)]
    #[case("https://", false)]
    #[case("https://exa mple.com", false)]
    #[case("example.com", false)]
    fn test_validate_url(#[case] url: &str, #[case] ok: bool) {
        assert_eq!(EndpointService::validate_url(url).is_ok(), ok);
    }

    #[test]
    fn test_empty_events_subscribe_to_all() {
        let ep = endpoint(vec![]);
        assert!(EventType::ALL.iter().all(|e| ep.subscribes_to(*e)));

        let ep = endpoint(vec![EventType::TransactionCompleted]);
        assert!(ep.subscribes_to(EventType::TransactionCompleted));
        assert!(!ep.subscribes_to(EventType::TransactionCreated));
    }

    #[test]
    fn test_inactive_endpoint_subscribes_to_nothing() {
        let mut ep = endpoint(vec![]);
        ep.is_active = false;
        assert!(!ep.subscribes_to(EventType::BalanceChanged));
    }

    #[test]
    fn test_secret_not_serialized() {
        let ep = endpoint(vec![]);
        let json = serde_json::to_value(&ep).unwrap();
        assert!(json.get("secret").is_none());
        assert_eq!(json["url"], "https://hooks.example.com/merchant");
    }

    #[test]
    fn test_reenable_resets_failures() {
        let mut ep = endpoint(vec![]);
        ep.is_active = false;
        ep.failure_count = 10;

        let next = EndpointService::apply_update(
            &ep,
            EndpointUpdate {
                is_active: Some(true),
                ..EndpointUpdate::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert!(next.is_active);
        assert_eq!(next.failure_count, 0);
    }

    #[test]
    fn test_disable_after_threshold() {
        let mut health = EndpointHealth {
            failure_count: 0,
            is_active: true,
        };
        for _ in 0..2 {
            health = EndpointService::after_attempt(health, false, 3);
            assert!(health.is_active);
        }
        health = EndpointService::after_attempt(health, false, 3);
        assert_eq!(health.failure_count, 3);
        assert!(!health.is_active);

        let reset = EndpointService::after_attempt(
            EndpointHealth {
                failure_count: 2,
                is_active: true,
            },
            true,
            3,
        );
        assert_eq!(reset.failure_count, 0);
    }
}

//! HTTP transport for webhook attempts.

use std::time::Duration;

use async_trait::async_trait;
use merchant_core::events::EventType;
use merchant_core::webhook::AttemptOutcome;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use uuid::Uuid;

/// `X-Webhook-Signature`: hex HMAC-SHA256 of the body.
///
/// Header names are lowercase; HTTP treats them case-insensitively.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
/// `X-Webhook-Event`: event type.
pub const EVENT_HEADER: &str = "x-webhook-event";
/// `X-Webhook-Delivery`: delivery id.
pub const DELIVERY_HEADER: &str = "x-webhook-delivery";
/// `Idempotency-Key`: the delivery id, for receiver-side dedupe.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

const RESPONSE_EXCERPT: usize = 1_024;

/// One signed request, ready to send.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Receiver URL.
    pub url: String,
    /// Exact body bytes that were signed.
    pub body: String,
    /// Hex HMAC of `body`.
    pub signature: String,
    /// Event type of the body.
    pub event_type: EventType,
    /// Delivery id, also the idempotency key.
    pub delivery_id: Uuid,
}

impl WebhookRequest {
    /// Headers sent with the request, user agent excluded.
    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let delivery = self.delivery_id.to_string();
        for (name, value) in [
            (SIGNATURE_HEADER, self.signature.as_str()),
            (EVENT_HEADER, self.event_type.as_str()),
            (DELIVERY_HEADER, delivery.as_str()),
            (IDEMPOTENCY_HEADER, delivery.as_str()),
        ] {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(name, value);
            }
        }
        headers
    }
}

/// Sends one webhook attempt and classifies the result.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Perform the attempt. Never panics and never retries.
    async fn send(&self, request: &WebhookRequest) -> AttemptOutcome;
}

/// `reqwest` transport with a per-attempt timeout.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn send(&self, request: &WebhookRequest) -> AttemptOutcome {
        let response = self
            .client
            .post(&request.url)
            .headers(request.headers())
            .body(request.body.clone())
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => AttemptOutcome::Delivered {
                status_code: response.status().as_u16(),
            },
            Ok(response) => {
                let status_code = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                AttemptOutcome::Rejected {
                    status_code,
                    body: body.chars().take(RESPONSE_EXCERPT).collect(),
                }
            }
            Err(err) if err.is_timeout() => AttemptOutcome::Transport(format!("timeout: {err}")),
            Err(err) => AttemptOutcome::Transport(err.to_string()),
        }
    }
}

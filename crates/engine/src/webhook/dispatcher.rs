//! Background delivery workers.
//!
//! Workers poll the durable queue, claim a batch of due deliveries under a
//! lease, attempt each once, and record the outcome only while their claim
//! token still holds. Retries are scheduled through `next_attempt_at`, never
//! awaited in place.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use merchant_core::webhook::{
    AttemptOutcome, AttemptRecord, BackoffPolicy, ClaimedDelivery, DeliveryService,
    WebhookError, WebhookSigner, WebhookStore,
};
use merchant_shared::config::WebhookConfig;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::webhook::transport::{WebhookRequest, WebhookTransport};

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Deliveries claimed.
    pub claimed: usize,
    /// Attempts that got a 2xx.
    pub delivered: usize,
    /// Attempts that failed and were rescheduled or exhausted.
    pub failed: usize,
    /// Outcomes discarded because the claim had expired.
    pub stale: usize,
}

/// Claims due deliveries and performs signed HTTP attempts.
pub struct WebhookDispatcher {
    store: Arc<dyn WebhookStore>,
    transport: Arc<dyn WebhookTransport>,
    policy: BackoffPolicy,
    lease: chrono::Duration,
    batch_size: u32,
    poll_interval: Duration,
    disable_after: u32,
}

impl WebhookDispatcher {
    /// Creates a dispatcher from the webhook configuration.
    #[must_use]
    pub fn new(
        store: Arc<dyn WebhookStore>,
        transport: Arc<dyn WebhookTransport>,
        config: &WebhookConfig,
    ) -> Self {
        Self {
            store,
            transport,
            policy: BackoffPolicy::new(
                seconds(config.base_delay_secs),
                seconds(config.max_delay_secs),
                config.max_attempts.max(1),
            ),
            lease: seconds(config.lease_secs),
            batch_size: u32::try_from(config.batch_size).unwrap_or(u32::MAX).max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            disable_after: config.disable_after_failures.max(1),
        }
    }

    /// The retry schedule in use.
    #[must_use]
    pub const fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// Claim one batch of deliveries due at `now` and attempt each once.
    ///
    /// Attempts in a batch run concurrently; each endpoint's outcome only
    /// touches its own delivery and failure streak.
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Result<DispatchSummary, WebhookError> {
        let claimed = self
            .store
            .claim_due(now, self.lease, self.batch_size)
            .await?;
        let mut summary = DispatchSummary {
            claimed: claimed.len(),
            ..DispatchSummary::default()
        };
        if claimed.is_empty() {
            return Ok(summary);
        }

        for (outcome, recorded) in join_all(claimed.into_iter().map(|c| self.attempt(c))).await {
            match (outcome.is_success(), recorded) {
                (_, false) => summary.stale += 1,
                (true, true) => summary.delivered += 1,
                (false, true) => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    /// Start `workers` polling loops on `tracker` until `cancel` fires.
    pub fn spawn_workers(
        self: &Arc<Self>,
        workers: usize,
        cancel: &CancellationToken,
        tracker: &TaskTracker,
    ) {
        for worker in 0..workers.max(1) {
            tracker.spawn(Arc::clone(self).run(worker, cancel.clone()));
        }
        info!(workers = workers.max(1), "Webhook workers started");
    }

    /// Poll loop of one worker. A full batch is followed immediately by the
    /// next pass; otherwise the worker sleeps for the poll interval.
    pub async fn run(self: Arc<Self>, worker: usize, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let busy = match self.dispatch_due(Utc::now()).await {
                Ok(summary) => {
                    if summary.claimed > 0 {
                        debug!(
                            worker,
                            claimed = summary.claimed,
                            delivered = summary.delivered,
                            failed = summary.failed,
                            stale = summary.stale,
                            "Webhook batch processed"
                        );
                    }
                    summary.claimed >= self.batch_size as usize
                }
                Err(err) => {
                    error!(worker, error = %err, "Webhook dispatch failed");
                    false
                }
            };
            if busy {
                continue;
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!(worker, "Webhook worker stopped");
    }

    async fn attempt(&self, claimed: ClaimedDelivery) -> (AttemptOutcome, bool) {
        let ClaimedDelivery {
            delivery,
            endpoint,
            claim_token,
        } = claimed;

        let outcome = if endpoint.is_active {
            match WebhookSigner::sign(&endpoint.secret, delivery.payload.as_bytes()) {
                Ok(signature) => {
                    let request = WebhookRequest {
                        url: endpoint.url.clone(),
                        body: delivery.payload.clone(),
                        signature,
                        event_type: delivery.event_type,
                        delivery_id: delivery.id,
                    };
                    self.transport.send(&request).await
                }
                Err(err) => AttemptOutcome::Transport(err.to_string()),
            }
        } else {
            AttemptOutcome::EndpointDisabled
        };

        let next = DeliveryService::apply_attempt(&delivery, &outcome, &self.policy, Utc::now());
        if !outcome.is_success() {
            warn!(
                delivery_id = %delivery.id,
                endpoint_id = %endpoint.id,
                company_id = %delivery.company_id,
                attempt = next.attempts,
                status = %next.status,
                error = next.last_error.as_deref().unwrap_or_default(),
                "Webhook attempt failed"
            );
        }

        let record = AttemptRecord {
            claim_token,
            delivery: next,
            endpoint_success: outcome
                .counts_as_attempt()
                .then(|| outcome.is_success()),
            disable_after: self.disable_after,
        };
        match self.store.record_attempt(record).await {
            Ok(true) => (outcome, true),
            Ok(false) => {
                warn!(delivery_id = %delivery.id, "Webhook claim expired before the attempt was recorded");
                (outcome, false)
            }
            Err(err) => {
                error!(delivery_id = %delivery.id, error = %err, "Cannot record webhook attempt");
                (outcome, false)
            }
        }
    }
}

/// Upper bound for configured delays and leases.
const MAX_CONFIGURED_SECS: u64 = 30 * 24 * 3_600;

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(secs.min(MAX_CONFIGURED_SECS)).unwrap_or_default())
}

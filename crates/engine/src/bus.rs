//! After-commit event fan-out.
//!
//! Each registered sink gets its own unbounded queue and drain task, so a
//! slow or failing sink never blocks the publisher or the other sinks. A sink
//! sees events in publish order; failed deliveries are retried in place with
//! exponential backoff before the sink moves on. The bus itself holds events
//! in memory only: webhook fan-out it could not complete is recovered from
//! the outbox, and live sessions are best effort.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use merchant_core::events::DomainEvent;
use merchant_core::webhook::WebhookError;
use merchant_shared::config::BusConfig;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

/// Errors a sink reports for one event.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Webhook deliveries could not be queued.
    #[error("Webhook enqueue failed: {0}")]
    Webhook(#[from] WebhookError),

    /// The sink's backing service is unavailable.
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

impl SinkError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        500
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Webhook(_) => "WEBHOOK_ENQUEUE_FAILED",
            Self::Unavailable(_) => "SINK_UNAVAILABLE",
        }
    }
}

/// A consumer of committed domain events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Handle one event. An error makes the bus retry the same event.
    async fn deliver(&self, event: &DomainEvent) -> Result<(), SinkError>;
}

struct SinkHandle {
    name: &'static str,
    sender: mpsc::UnboundedSender<Arc<DomainEvent>>,
}

/// In-process publish/subscribe bus for committed events.
pub struct EventBus {
    config: BusConfig,
    sinks: Mutex<Vec<SinkHandle>>,
    tracker: TaskTracker,
}

impl EventBus {
    /// Creates a bus with no sinks.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            sinks: Mutex::new(Vec::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Register a sink and start its drain task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn register(&self, sink: Arc<dyn EventSink>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let name = sink.name();
        self.tracker
            .spawn(drain(sink, receiver, self.config.clone()));
        self.lock().push(SinkHandle { name, sender });
        debug!(sink = name, "Event sink registered");
    }

    /// Hand an event to every sink. Never blocks and never fails.
    pub fn publish(&self, event: DomainEvent) {
        let event = Arc::new(event);
        let mut sinks = self.lock();
        sinks.retain(|handle| match handle.sender.send(Arc::clone(&event)) {
            Ok(()) => true,
            Err(_) => {
                warn!(sink = handle.name, "Event sink stopped, removing");
                false
            }
        });
    }

    /// Number of live sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.lock().len()
    }

    /// Stop accepting events and wait until every sink drained its queue.
    pub async fn shutdown(&self) {
        self.lock().clear();
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SinkHandle>> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn drain(
    sink: Arc<dyn EventSink>,
    mut receiver: mpsc::UnboundedReceiver<Arc<DomainEvent>>,
    config: BusConfig,
) {
    let attempts = config.sink_retry_attempts.max(1);
    while let Some(event) = receiver.recv().await {
        let mut attempt = 1;
        loop {
            match sink.deliver(&event).await {
                Ok(()) => break,
                Err(err) if attempt < attempts => {
                    warn!(
                        sink = sink.name(),
                        event_type = %event.event_type,
                        company_id = %event.company_id,
                        attempt,
                        error = %err,
                        "Event sink failed, retrying"
                    );
                    tokio::time::sleep(retry_delay(config.sink_retry_base_ms, attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        sink = sink.name(),
                        event_type = %event.event_type,
                        company_id = %event.company_id,
                        entity_id = %event.entity_id,
                        attempts,
                        error = %err,
                        "Event sink skipped event after retries"
                    );
                    break;
                }
            }
        }
    }
    debug!(sink = sink.name(), "Event sink drained");
}

fn retry_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

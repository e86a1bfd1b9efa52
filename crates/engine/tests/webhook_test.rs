//! Webhook fan-out, retry schedule, endpoint health, and signed delivery.

mod common;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;
use tokio::sync::mpsc;

use merchant_core::audit::AuditEntry;
use merchant_core::events::{DomainEvent, EventType};
use merchant_core::ledger::Direction;
use merchant_core::webhook::{
    AttemptOutcome, AttemptRecord, ClaimedDelivery, DeliveryStatus, EndpointUpdate, NewEndpoint,
    WebhookDelivery, WebhookEndpoint, WebhookError, WebhookSigner, WebhookStore,
};
use merchant_engine::webhook::transport::{IDEMPOTENCY_HEADER, SIGNATURE_HEADER};
use merchant_engine::{
    MemoryStore, ReqwestTransport, WebhookDispatcher, WebhookEndpoints, WebhookFanout, WebhookRequest,
    WebhookTransport,
};
use merchant_shared::PageRequest;
use merchant_shared::config::WebhookConfig;

use common::{Harness, bank, harness};

/// Plays back scripted outcomes, then keeps answering with a 500.
#[derive(Default)]
struct ScriptedTransport {
    outcomes: Mutex<VecDeque<AttemptOutcome>>,
    requests: Mutex<Vec<WebhookRequest>>,
}

impl ScriptedTransport {
    fn with(outcomes: impl IntoIterator<Item = AttemptOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookTransport for ScriptedTransport {
    async fn send(&self, request: &WebhookRequest) -> AttemptOutcome {
        self.requests.lock().unwrap().push(request.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AttemptOutcome::Rejected {
                status_code: 500,
                body: "upstream down".to_string(),
            })
    }
}

/// Delegates to `MemoryStore` but fails the first `outages` endpoint lookups.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    outages: AtomicU32,
}

#[async_trait]
impl WebhookStore for FlakyStore {
    async fn endpoints(&self, company_id: Uuid) -> Result<Vec<WebhookEndpoint>, WebhookError> {
        if self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(WebhookError::Storage("connection refused".to_string()));
        }
        self.inner.endpoints(company_id).await
    }

    async fn endpoint(
        &self,
        company_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<Option<WebhookEndpoint>, WebhookError> {
        self.inner.endpoint(company_id, endpoint_id).await
    }

    async fn create_endpoint(
        &self,
        endpoint: WebhookEndpoint,
        audit: AuditEntry,
    ) -> Result<WebhookEndpoint, WebhookError> {
        self.inner.create_endpoint(endpoint, audit).await
    }

    async fn update_endpoint(
        &self,
        endpoint: WebhookEndpoint,
        audit: AuditEntry,
    ) -> Result<WebhookEndpoint, WebhookError> {
        self.inner.update_endpoint(endpoint, audit).await
    }

    async fn record_event(&self, event: &DomainEvent) -> Result<(), WebhookError> {
        self.inner.record_event(event).await
    }

    async fn pending_events(
        &self,
        before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DomainEvent>, WebhookError> {
        self.inner.pending_events(before, limit).await
    }

    async fn fan_out(
        &self,
        event: &DomainEvent,
        deliveries: Vec<WebhookDelivery>,
    ) -> Result<bool, WebhookError> {
        self.inner.fan_out(event, deliveries).await
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: chrono::Duration,
        limit: u32,
    ) -> Result<Vec<ClaimedDelivery>, WebhookError> {
        self.inner.claim_due(now, lease, limit).await
    }

    async fn record_attempt(&self, record: AttemptRecord) -> Result<bool, WebhookError> {
        self.inner.record_attempt(record).await
    }

    async fn deliveries(
        &self,
        company_id: Uuid,
        endpoint_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<WebhookDelivery>, WebhookError> {
        self.inner.deliveries(company_id, endpoint_id, page).await
    }
}

fn config() -> WebhookConfig {
    WebhookConfig {
        max_attempts: 3,
        base_delay_secs: 30,
        max_delay_secs: 3_600,
        disable_after_failures: 3,
        ..WebhookConfig::default()
    }
}

/// Registers an endpoint and the fan-out sink, then completes one deposit.
async fn deliver_one(h: &Harness, url: &str, events: Vec<EventType>) -> WebhookEndpoint {
    let endpoints = WebhookEndpoints::new(h.store.clone());
    let endpoint = endpoints
        .create(
            &h.tenant.admin,
            NewEndpoint {
                url: url.to_string(),
                events,
            },
        )
        .await
        .unwrap();
    h.bus.register(Arc::new(WebhookFanout::new(h.store.clone())));

    h.ledger
        .create(&h.tenant.teller, bank(&h.tenant, Direction::In, dec!(75)))
        .await
        .unwrap();
    h.settle().await;
    endpoint
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fanout_respects_subscriptions() {
    let h = harness().await;
    let endpoint = deliver_one(
        &h,
        "https://hooks.example.com/ledger",
        vec![EventType::TransactionCompleted],
    )
    .await;

    let endpoints = WebhookEndpoints::new(h.store.clone());
    let deliveries = endpoints
        .deliveries(&h.tenant.admin, endpoint.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].event_type, EventType::TransactionCompleted);
    assert_eq!(deliveries[0].status, DeliveryStatus::Pending);
    assert_eq!(deliveries[0].attempts, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retries_back_off_then_exhaust_and_disable() {
    let h = harness().await;
    let endpoint = deliver_one(
        &h,
        "https://hooks.example.com/ledger",
        vec![EventType::TransactionCompleted],
    )
    .await;
    let endpoints = WebhookEndpoints::new(h.store.clone());

    let transport = Arc::new(ScriptedTransport::with([
        AttemptOutcome::Transport("connection refused".to_string()),
        AttemptOutcome::Rejected {
            status_code: 503,
            body: "maintenance".to_string(),
        },
    ]));
    let dispatcher = WebhookDispatcher::new(h.store.clone(), transport.clone(), &config());
    let policy = dispatcher.policy();

    for attempt in 1..=3u32 {
        // Far enough ahead that any scheduled retry is due.
        let summary = dispatcher
            .dispatch_due(Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(summary.claimed, 1);
        assert_eq!(summary.failed, 1);

        let delivery = endpoints
            .deliveries(&h.tenant.admin, endpoint.id, PageRequest::default())
            .await
            .unwrap()
            .remove(0);
        assert_eq!(delivery.attempts, attempt);
        if attempt < 3 {
            assert_eq!(delivery.status, DeliveryStatus::Failed);
            let delay = delivery.next_attempt_at.unwrap() - delivery.updated_at;
            assert_eq!(delay, policy.delay_for(attempt));
        } else {
            assert_eq!(delivery.status, DeliveryStatus::Exhausted);
            assert_eq!(delivery.next_attempt_at, None);
            assert_eq!(delivery.last_status_code, Some(500));
        }
    }
    assert_eq!(
        policy.delay_for(2),
        policy.delay_for(1) * 2,
        "delays double"
    );

    let summary = dispatcher
        .dispatch_due(Utc::now() + chrono::Duration::days(30))
        .await
        .unwrap();
    assert_eq!(summary.claimed, 0);

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.windows(2).all(|w| w[0].delivery_id == w[1].delivery_id));
    assert!(requests.windows(2).all(|w| w[0].body == w[1].body));

    let stored = endpoints.list(&h.tenant.admin).await.unwrap();
    assert_eq!(stored[0].failure_count, 3);
    assert!(!stored[0].is_active);
    assert!(stored[0].last_attempt_at.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_success_resets_failure_streak() {
    let h = harness().await;
    let endpoint = deliver_one(&h, "https://hooks.example.com/ledger", vec![]).await;
    let endpoints = WebhookEndpoints::new(h.store.clone());

    // created + completed: the first attempt fails, the rest succeed.
    let transport = Arc::new(ScriptedTransport::with([
        AttemptOutcome::Transport("timeout".to_string()),
        AttemptOutcome::Delivered { status_code: 204 },
        AttemptOutcome::Delivered { status_code: 200 },
    ]));
    let dispatcher = WebhookDispatcher::new(h.store.clone(), transport.clone(), &config());

    let first = dispatcher.dispatch_due(Utc::now()).await.unwrap();
    assert_eq!(first.claimed, 2);
    assert_eq!(first.delivered + first.failed, 2);

    let second = dispatcher
        .dispatch_due(Utc::now() + chrono::Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(second.claimed, 1);
    assert_eq!(second.delivered, 1);

    let deliveries = endpoints
        .deliveries(&h.tenant.admin, endpoint.id, PageRequest::default())
        .await
        .unwrap();
    assert!(
        deliveries
            .iter()
            .all(|d| d.status == DeliveryStatus::Delivered && d.delivered_at.is_some())
    );
    let stored = endpoints.list(&h.tenant.admin).await.unwrap();
    assert_eq!(stored[0].failure_count, 0);
    assert!(stored[0].is_active);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deactivated_endpoint_exhausts_without_request() {
    let h = harness().await;
    let endpoint = deliver_one(
        &h,
        "https://hooks.example.com/ledger",
        vec![EventType::TransactionCompleted],
    )
    .await;
    let endpoints = WebhookEndpoints::new(h.store.clone());
    endpoints
        .update(
            &h.tenant.admin,
            endpoint.id,
            EndpointUpdate {
                is_active: Some(false),
                ..EndpointUpdate::default()
            },
        )
        .await
        .unwrap();

    let transport = Arc::new(ScriptedTransport::default());
    let dispatcher = WebhookDispatcher::new(h.store.clone(), transport.clone(), &config());
    let summary = dispatcher.dispatch_due(Utc::now()).await.unwrap();
    assert_eq!(summary.claimed, 1);
    assert!(transport.requests().is_empty());

    let delivery = endpoints
        .deliveries(&h.tenant.admin, endpoint.id, PageRequest::default())
        .await
        .unwrap()
        .remove(0);
    assert_eq!(delivery.status, DeliveryStatus::Exhausted);
    assert_eq!(delivery.attempts, 0);
    assert_eq!(delivery.last_error.as_deref(), Some("endpoint disabled"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_endpoint_management_requires_admin() {
    let h = harness().await;
    let endpoints = WebhookEndpoints::new(h.store.clone());

    let err = endpoints
        .create(
            &h.tenant.manager,
            NewEndpoint {
                url: "https://hooks.example.com/ledger".to_string(),
                events: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::InsufficientRole { .. }));

    let err = endpoints
        .create(
            &h.tenant.admin,
            NewEndpoint {
                url: "ftp://hooks.example.com".to_string(),
                events: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::InvalidEndpoint(_)));

    let err = endpoints
        .update(&h.tenant.admin, uuid::Uuid::new_v4(), EndpointUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::EndpointNotFound(_)));
}

#[derive(Clone)]
struct Received(mpsc::UnboundedSender<(HeaderMap, String)>);

async fn receive(State(received): State<Received>, headers: HeaderMap, body: String) -> StatusCode {
    let _ = received.0.send((headers, body));
    StatusCode::OK
}

#[tokio::test(flavor = "multi_thread")]
async fn test_signed_delivery_to_live_receiver() {
    let (sender, mut inbox) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/hook", post(receive))
        .with_state(Received(sender));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let h = harness().await;
    let endpoint = deliver_one(
        &h,
        &format!("http://{addr}/hook"),
        vec![EventType::TransactionCompleted],
    )
    .await;

    let transport = Arc::new(
        ReqwestTransport::new(Duration::from_secs(5), "MerchantPlus-Webhook/test").unwrap(),
    );
    let dispatcher = WebhookDispatcher::new(h.store.clone(), transport, &config());
    let summary = dispatcher.dispatch_due(Utc::now()).await.unwrap();
    assert_eq!(summary.delivered, 1);

    let (headers, body) = tokio::time::timeout(Duration::from_secs(5), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    let signature = headers[SIGNATURE_HEADER].to_str().unwrap();
    assert!(WebhookSigner::verify(&endpoint.secret, body.as_bytes(), signature));
    assert!(!WebhookSigner::verify("other-secret", body.as_bytes(), signature));

    let event: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(event["event"], "transaction.completed");
    assert_eq!(event["company_id"], h.tenant.company.id.to_string());

    let delivery = WebhookEndpoints::new(h.store.clone())
        .deliveries(&h.tenant.admin, endpoint.id, PageRequest::default())
        .await
        .unwrap()
        .remove(0);
    assert_eq!(
        headers[IDEMPOTENCY_HEADER].to_str().unwrap(),
        delivery.id.to_string()
    );
    assert_eq!(delivery.status, DeliveryStatus::Delivered);
    assert_eq!(delivery.last_status_code, Some(200));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_events_survive_store_outage_until_sweep() {
    let h = harness().await;
    let endpoints = WebhookEndpoints::new(h.store.clone());
    let endpoint = endpoints
        .create(
            &h.tenant.admin,
            NewEndpoint {
                url: "https://hooks.example.com/ledger".to_string(),
                events: vec![EventType::TransactionCreated, EventType::TransactionCompleted],
            },
        )
        .await
        .unwrap();

    // Outlasts the bus retries for the first event.
    let flaky = Arc::new(FlakyStore {
        inner: h.store.clone(),
        outages: AtomicU32::new(3),
    });
    let fanout = WebhookFanout::new(flaky.clone());
    h.bus.register(Arc::new(WebhookFanout::new(flaky)));

    let tx = h
        .ledger
        .create(&h.tenant.teller, bank(&h.tenant, Direction::In, dec!(50)))
        .await
        .unwrap();
    h.settle().await;

    let queued = |deliveries: Vec<WebhookDelivery>| {
        let mut types: Vec<&str> = deliveries.iter().map(|d| d.event_type.as_str()).collect();
        types.sort_unstable();
        types.into_iter().map(str::to_string).collect::<Vec<_>>()
    };
    let before = endpoints
        .deliveries(&h.tenant.admin, endpoint.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(queued(before), vec!["transaction.completed"]);

    let pending = h.store.pending_events(Utc::now(), 100).await.unwrap();
    assert!(
        pending
            .iter()
            .any(|e| e.entity_id == tx.id && e.event_type == EventType::TransactionCreated)
    );

    assert!(fanout.sweep(Utc::now(), 100).await.unwrap() >= 1);
    let after = endpoints
        .deliveries(&h.tenant.admin, endpoint.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(
        queued(after),
        vec!["transaction.completed", "transaction.created"]
    );

    assert_eq!(fanout.sweep(Utc::now(), 100).await.unwrap(), 0);
    assert!(h.store.pending_events(Utc::now(), 100).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fan_out_is_acknowledged_once() {
    let h = harness().await;
    let endpoint = deliver_one(&h, "https://hooks.example.com/all", vec![]).await;
    let fanout = WebhookFanout::new(h.store.clone());

    let pending = h.store.pending_events(Utc::now(), 100).await.unwrap();
    for event in &pending {
        fanout.fan_out(event).await.unwrap();
    }
    let endpoints = WebhookEndpoints::new(h.store.clone());
    let first = endpoints
        .deliveries(&h.tenant.admin, endpoint.id, PageRequest::default())
        .await
        .unwrap()
        .len();

    let replayed = h.store.pending_events(Utc::now(), 100).await.unwrap();
    assert!(replayed.is_empty());
    let completed = DomainEvent::new(
        EventType::TransactionCompleted,
        h.tenant.company.id,
        Uuid::new_v4(),
        serde_json::json!({}),
        Utc::now(),
    );
    assert_eq!(fanout.fan_out(&completed).await.unwrap(), 1);
    assert_eq!(fanout.fan_out(&completed).await.unwrap(), 0);

    let second = endpoints
        .deliveries(&h.tenant.admin, endpoint.id, PageRequest::default())
        .await
        .unwrap()
        .len();
    assert_eq!(second, first + 1);
}

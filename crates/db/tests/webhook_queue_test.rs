//! Integration tests for the webhook delivery queue.
//!
//! Requires a PostgreSQL database at `DATABASE_URL`; run with
//! `cargo test -p merchant-db -- --ignored`.

mod common;

use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

use merchant_core::audit::{AuditAction, EntityType};
use merchant_core::events::{DomainEvent, EventType};
use merchant_core::webhook::{
    AttemptOutcome, AttemptRecord, BackoffPolicy, DeliveryService, DeliveryStatus,
    EndpointService, NewEndpoint, WebhookStore,
};
use merchant_db::WebhookRepository;
use merchant_db::entities::{sea_orm_active_enums as db_enums, webhook_deliveries};
use merchant_db::rls::RlsConnection;
use sea_orm::{ConnectionTrait, DbBackend, EntityTrait, Statement};

use common::{Tenant, audit, connect, tenant};

async fn endpoint(repo: &WebhookRepository, t: &Tenant) -> merchant_core::webhook::WebhookEndpoint {
    let endpoint = EndpointService::create(
        t.company.id,
        NewEndpoint {
            url: "https://hooks.example.com/merchant".to_string(),
            events: vec![],
        },
        Utc::now(),
    )
    .unwrap();
    let entry = audit(
        t.company.id,
        AuditAction::CreateWebhook,
        (EntityType::WebhookEndpoint, endpoint.id),
    );
    repo.create_endpoint(endpoint, entry).await.unwrap()
}

fn event(t: &Tenant) -> DomainEvent {
    DomainEvent::new(
        EventType::TransactionCreated,
        t.company.id,
        Uuid::new_v4(),
        json!({"transaction": null}),
        Utc::now(),
    )
}

/// Fans out a fresh event to `ep` and returns the queued delivery id.
async fn queue(
    repo: &WebhookRepository,
    ep: &merchant_core::webhook::WebhookEndpoint,
    t: &Tenant,
    due: chrono::DateTime<Utc>,
) -> Uuid {
    let event = event(t);
    let delivery = DeliveryService::enqueue(ep, &event, due).unwrap();
    let id = delivery.id;
    assert!(repo.fan_out(&event, vec![delivery]).await.unwrap());
    id
}

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_concurrent_claims_are_disjoint() {
    let db = connect().await;
    let t = tenant(&db).await;
    let repo = WebhookRepository::new(db.clone());
    let ep = endpoint(&repo, &t).await;

    let now = Utc::now();
    for _ in 0..20 {
        queue(&repo, &ep, &t, now - Duration::seconds(1)).await;
    }

    let (a, b) = tokio::join!(
        repo.claim_due(now, Duration::seconds(60), 15),
        repo.claim_due(now, Duration::seconds(60), 15),
    );
    let a: HashSet<Uuid> = a.unwrap().iter().map(|c| c.delivery.id).collect();
    let b: HashSet<Uuid> = b.unwrap().iter().map(|c| c.delivery.id).collect();

    assert!(a.is_disjoint(&b));
    // Other tests may share the queue, so only a lower bound holds.
    assert!(a.len() + b.len() >= 20);

    // Leased rows are not due again until the lease ends.
    let again = repo.claim_due(now, Duration::seconds(60), 100).await.unwrap();
    assert!(again.iter().all(|c| !a.contains(&c.delivery.id) && !b.contains(&c.delivery.id)));
}

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_stale_claim_token_cannot_record() {
    let db = connect().await;
    let t = tenant(&db).await;
    let repo = WebhookRepository::new(db.clone());
    let ep = endpoint(&repo, &t).await;

    let now = Utc::now();
    let id = queue(&repo, &ep, &t, now - Duration::seconds(1)).await;

    // First lease expires immediately, so a second worker can take over.
    let first = loop {
        let claimed = repo.claim_due(now, Duration::zero(), 100).await.unwrap();
        if let Some(c) = claimed.into_iter().find(|c| c.delivery.id == id) {
            break c;
        }
    };
    let second = loop {
        let claimed = repo.claim_due(now, Duration::seconds(60), 100).await.unwrap();
        if let Some(c) = claimed.into_iter().find(|c| c.delivery.id == id) {
            break c;
        }
    };
    assert_ne!(first.claim_token, second.claim_token);

    let outcome = AttemptOutcome::Delivered { status_code: 200 };
    let next = DeliveryService::apply_attempt(
        &first.delivery,
        &outcome,
        &BackoffPolicy::default(),
        Utc::now(),
    );
    let stale = repo
        .record_attempt(AttemptRecord {
            claim_token: first.claim_token,
            delivery: next.clone(),
            endpoint_success: Some(true),
            disable_after: 10,
        })
        .await
        .unwrap();
    assert!(!stale);

    let fresh = repo
        .record_attempt(AttemptRecord {
            claim_token: second.claim_token,
            delivery: next,
            endpoint_success: Some(true),
            disable_after: 10,
        })
        .await
        .unwrap();
    assert!(fresh);

    let stored = repo
        .deliveries(t.company.id, ep.id, merchant_shared::PageRequest::default())
        .await
        .unwrap();
    assert_eq!(stored[0].status, DeliveryStatus::Delivered);
    assert_eq!(stored[0].attempts, 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_failure_streak_disables_endpoint() {
    let db = connect().await;
    let t = tenant(&db).await;
    let repo = WebhookRepository::new(db.clone());
    let ep = endpoint(&repo, &t).await;

    for _ in 0..2 {
        let now = Utc::now();
        let id = queue(&repo, &ep, &t, now - Duration::seconds(1)).await;

        let claimed = loop {
            let claimed = repo.claim_due(now, Duration::seconds(60), 100).await.unwrap();
            if let Some(c) = claimed.into_iter().find(|c| c.delivery.id == id) {
                break c;
            }
        };
        let outcome = AttemptOutcome::Transport("connection refused".to_string());
        let next =
            DeliveryService::apply_attempt(&claimed.delivery, &outcome, &BackoffPolicy::default(), now);
        assert!(
            repo.record_attempt(AttemptRecord {
                claim_token: claimed.claim_token,
                delivery: next,
                endpoint_success: Some(false),
                disable_after: 2,
            })
            .await
            .unwrap()
        );
    }

    let stored = repo.endpoint(t.company.id, ep.id).await.unwrap().unwrap();
    assert_eq!(stored.failure_count, 2);
    assert!(!stored.is_active);
}

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_outbox_event_is_fanned_out_once() {
    let db = connect().await;
    let t = tenant(&db).await;
    let repo = WebhookRepository::new(db.clone());
    let ep = endpoint(&repo, &t).await;

    let mut recorded = event(&t);
    recorded.occurred_at = Utc::now() - Duration::seconds(5);
    repo.record_event(&recorded).await.unwrap();
    // Recording twice keeps a single row.
    repo.record_event(&recorded).await.unwrap();

    let pending = repo.pending_events(Utc::now(), 1000).await.unwrap();
    assert_eq!(pending.iter().filter(|e| e.id == recorded.id).count(), 1);
    let stored = pending.into_iter().find(|e| e.id == recorded.id).unwrap();
    assert_eq!(stored.event_type, recorded.event_type);
    assert_eq!(stored.entity_id, recorded.entity_id);

    let delivery = DeliveryService::enqueue(&ep, &stored, Utc::now()).unwrap();
    let duplicate = DeliveryService::enqueue(&ep, &stored, Utc::now()).unwrap();
    let (a, b) = tokio::join!(
        repo.fan_out(&stored, vec![delivery]),
        repo.fan_out(&stored, vec![duplicate]),
    );
    assert!(a.unwrap() ^ b.unwrap());

    let pending = repo.pending_events(Utc::now(), 1000).await.unwrap();
    assert!(pending.iter().all(|e| e.id != recorded.id));

    let queued = repo
        .deliveries(t.company.id, ep.id, merchant_shared::PageRequest::default())
        .await
        .unwrap();
    assert_eq!(queued.len(), 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_unreadable_delivery_is_exhausted_not_returned() {
    let db = connect().await;
    let t = tenant(&db).await;
    let repo = WebhookRepository::new(db.clone());
    let ep = endpoint(&repo, &t).await;

    let now = Utc::now();
    let good = queue(&repo, &ep, &t, now - Duration::seconds(1)).await;

    // A row whose event type no longer parses.
    let bad = Uuid::new_v4();
    let rls = RlsConnection::new(&db, t.company.id).await.unwrap();
    rls.transaction()
        .execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "INSERT INTO webhook_deliveries \
             (id, company_id, endpoint_id, event_type, entity_id, payload, next_attempt_at) \
             VALUES ($1, $2, $3, 'transaction.unknown', $4, '{}', $5)",
            [
                bad.into(),
                t.company.id.into(),
                ep.id.into(),
                Uuid::new_v4().into(),
                (now - Duration::seconds(1)).fixed_offset().into(),
            ],
        ))
        .await
        .unwrap();
    rls.commit().await.unwrap();

    let fetch = |id: Uuid| {
        let db = db.clone();
        let company_id = t.company.id;
        async move {
            let rls = RlsConnection::new(&db, company_id).await.unwrap();
            let row = webhook_deliveries::Entity::find_by_id(id)
                .one(rls.transaction())
                .await
                .unwrap()
                .unwrap();
            rls.rollback().await.unwrap();
            row
        }
    };

    // Other tests share the queue, so claim until the bad row was handled.
    let mut claimed = HashSet::new();
    let bad_row = loop {
        let batch = repo.claim_due(now, Duration::seconds(60), 100).await.unwrap();
        claimed.extend(batch.iter().map(|c| c.delivery.id));
        let current = fetch(bad).await;
        if current.status == db_enums::DeliveryStatus::Exhausted {
            break current;
        }
        assert!(!batch.is_empty(), "unreadable row was never claimed");
    };
    assert!(!claimed.contains(&bad));

    let good_row = fetch(good).await;
    assert_eq!(good_row.status, db_enums::DeliveryStatus::Pending);
    assert!(good_row.claim_token.is_some());

    assert_eq!(bad_row.last_error.as_deref(), Some("Unreadable delivery row"));
    assert!(bad_row.claim_token.is_none());
}

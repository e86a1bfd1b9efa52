//! Webhook endpoint registry, event outbox and durable delivery queue.
//!
//! Ledger commits append their event to `event_outbox` in the same
//! transaction. Fan-out queues the deliveries and stamps `fanned_out_at`
//! atomically, so an event is fanned out at most once.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use merchant_shared::PageRequest;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, Statement, sea_query::OnConflict,
};
use std::collections::HashMap;
use uuid::Uuid;

use merchant_core::audit::AuditEntry;
use merchant_core::events::DomainEvent;
use merchant_core::webhook::{
    AttemptRecord, ClaimedDelivery, EndpointHealth, EndpointService, WebhookDelivery,
    WebhookEndpoint, WebhookError, WebhookStore,
};

use crate::convert;
use crate::entities::{
    event_outbox, sea_orm_active_enums as db, webhook_deliveries, webhook_endpoints,
};
use crate::repositories::audit;
use crate::rls::RlsConnection;

/// Leases due deliveries; `SKIP LOCKED` keeps concurrent claimers disjoint.
const CLAIM_DUE_SQL: &str = r"
WITH due AS (
    SELECT id
    FROM webhook_deliveries
    WHERE status IN ('pending', 'failed')
      AND next_attempt_at <= $1
      AND (claimed_until IS NULL OR claimed_until <= $1)
    ORDER BY next_attempt_at, created_at
    LIMIT $2
    FOR UPDATE SKIP LOCKED
)
UPDATE webhook_deliveries d
SET claim_token = gen_random_uuid(), claimed_until = $3
FROM due
WHERE d.id = due.id
RETURNING d.*
";

/// Inserts the event, or acknowledges it if it was recorded earlier.
/// Affects no row when the event was already fanned out.
const ACK_EVENT_SQL: &str = r"
INSERT INTO event_outbox
    (id, company_id, event_type, entity_id, payload, occurred_at, fanned_out_at)
VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (id) DO UPDATE SET fanned_out_at = EXCLUDED.fanned_out_at
WHERE event_outbox.fanned_out_at IS NULL
";

const UNREADABLE_DELIVERY: &str = "Unreadable delivery row";

/// Append an event to the outbox inside the caller's transaction.
pub(crate) async fn append_event<C: ConnectionTrait>(
    conn: &C,
    event: &DomainEvent,
) -> Result<(), DbErr> {
    let active = convert::outbox_active(event, None).map_err(|e| DbErr::Custom(e.to_string()))?;
    event_outbox::Entity::insert(active).exec(conn).await?;
    Ok(())
}

fn storage(e: DbErr) -> WebhookError {
    WebhookError::Storage(e.to_string())
}

/// `PostgreSQL` implementation of the webhook port.
#[derive(Debug, Clone)]
pub struct WebhookRepository {
    db: DatabaseConnection,
}

impl WebhookRepository {
    /// Creates a new webhook repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn scoped(&self, company_id: Uuid) -> Result<RlsConnection, WebhookError> {
        RlsConnection::new(&self.db, company_id)
            .await
            .map_err(storage)
    }

    async fn system(&self) -> Result<RlsConnection, WebhookError> {
        RlsConnection::system(&self.db).await.map_err(storage)
    }
}

fn unreadable(id: Uuid) -> WebhookError {
    WebhookError::Storage(format!("Unreadable webhook delivery {id}"))
}

#[async_trait]
impl WebhookStore for WebhookRepository {
    async fn endpoints(&self, company_id: Uuid) -> Result<Vec<WebhookEndpoint>, WebhookError> {
        let rls = self.scoped(company_id).await?;
        let models = webhook_endpoints::Entity::find()
            .filter(webhook_endpoints::Column::CompanyId.eq(company_id))
            .order_by_asc(webhook_endpoints::Column::CreatedAt)
            .all(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;
        Ok(models.into_iter().map(convert::endpoint).collect())
    }

    async fn endpoint(
        &self,
        company_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<Option<WebhookEndpoint>, WebhookError> {
        let rls = self.scoped(company_id).await?;
        let model = webhook_endpoints::Entity::find_by_id(endpoint_id)
            .filter(webhook_endpoints::Column::CompanyId.eq(company_id))
            .one(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;
        Ok(model.map(convert::endpoint))
    }

    async fn create_endpoint(
        &self,
        endpoint: WebhookEndpoint,
        audit: AuditEntry,
    ) -> Result<WebhookEndpoint, WebhookError> {
        let rls = self.scoped(endpoint.company_id).await?;
        let txn = rls.transaction();
        webhook_endpoints::Entity::insert(convert::endpoint_active(&endpoint))
            .exec(txn)
            .await
            .map_err(storage)?;
        audit::append(txn, &audit).await.map_err(storage)?;
        rls.commit().await.map_err(storage)?;
        Ok(endpoint)
    }

    async fn update_endpoint(
        &self,
        endpoint: WebhookEndpoint,
        audit: AuditEntry,
    ) -> Result<WebhookEndpoint, WebhookError> {
        let rls = self.scoped(endpoint.company_id).await?;
        let txn = rls.transaction();

        let active = convert::endpoint_active(&endpoint);
        let result = webhook_endpoints::Entity::update_many()
            .set(webhook_endpoints::ActiveModel {
                url: active.url,
                events: active.events,
                is_active: active.is_active,
                failure_count: active.failure_count,
                updated_at: active.updated_at,
                ..Default::default()
            })
            .filter(webhook_endpoints::Column::Id.eq(endpoint.id))
            .filter(webhook_endpoints::Column::CompanyId.eq(endpoint.company_id))
            .exec(txn)
            .await
            .map_err(storage)?;

        if result.rows_affected == 0 {
            return Err(WebhookError::EndpointNotFound(endpoint.id));
        }

        audit::append(txn, &audit).await.map_err(storage)?;
        rls.commit().await.map_err(storage)?;
        Ok(endpoint)
    }

    async fn record_event(&self, event: &DomainEvent) -> Result<(), WebhookError> {
        let rls = self.scoped(event.company_id).await?;
        let active = convert::outbox_active(event, None)?;
        event_outbox::Entity::insert(active)
            .on_conflict(
                OnConflict::column(event_outbox::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .do_nothing()
            .exec(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)
    }

    async fn pending_events(
        &self,
        before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DomainEvent>, WebhookError> {
        let rls = self.system().await?;
        let txn = rls.transaction();
        let models = event_outbox::Entity::find()
            .filter(event_outbox::Column::FannedOutAt.is_null())
            .filter(event_outbox::Column::OccurredAt.lt(convert::fixed(before)))
            .order_by_asc(event_outbox::Column::OccurredAt)
            .limit(u64::from(limit))
            .all(txn)
            .await
            .map_err(storage)?;

        let mut events = Vec::with_capacity(models.len());
        let mut unreadable = Vec::new();
        for model in &models {
            match convert::outbox_event(model) {
                Ok(event) => events.push(event),
                Err(err) => unreadable.push((model.id, err.to_string())),
            }
        }
        // Rows that no longer decode would block the head of the queue.
        let now = convert::fixed(Utc::now());
        for (id, error) in unreadable {
            event_outbox::Entity::update_many()
                .set(event_outbox::ActiveModel {
                    fanned_out_at: Set(Some(now)),
                    last_error: Set(Some(error)),
                    ..Default::default()
                })
                .filter(event_outbox::Column::Id.eq(id))
                .exec(txn)
                .await
                .map_err(storage)?;
        }
        rls.commit().await.map_err(storage)?;
        Ok(events)
    }

    async fn fan_out(
        &self,
        event: &DomainEvent,
        deliveries: Vec<WebhookDelivery>,
    ) -> Result<bool, WebhookError> {
        let rls = self.scoped(event.company_id).await?;
        let txn = rls.transaction();

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            ACK_EVENT_SQL,
            [
                event.id.into(),
                event.company_id.into(),
                event.event_type.as_str().into(),
                event.entity_id.into(),
                event.to_body()?.into(),
                convert::fixed(event.occurred_at).into(),
                convert::fixed(Utc::now()).into(),
            ],
        );
        let acked = txn.execute(stmt).await.map_err(storage)?;
        if acked.rows_affected() == 0 {
            rls.rollback().await.map_err(storage)?;
            return Ok(false);
        }

        if !deliveries.is_empty() {
            webhook_deliveries::Entity::insert_many(
                deliveries.iter().map(convert::delivery_active),
            )
            .exec(txn)
            .await
            .map_err(storage)?;
        }
        rls.commit().await.map_err(storage)?;
        Ok(true)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: u32,
    ) -> Result<Vec<ClaimedDelivery>, WebhookError> {
        let rls = self.system().await?;
        let txn = rls.transaction();

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            CLAIM_DUE_SQL,
            [
                convert::fixed(now).into(),
                i64::from(limit).into(),
                convert::fixed(now + lease).into(),
            ],
        );
        let claimed = webhook_deliveries::Entity::find()
            .from_raw_sql(stmt)
            .all(txn)
            .await
            .map_err(storage)?;

        if claimed.is_empty() {
            rls.commit().await.map_err(storage)?;
            return Ok(Vec::new());
        }

        let endpoint_ids: Vec<Uuid> = claimed.iter().map(|d| d.endpoint_id).collect();
        let endpoints: HashMap<Uuid, WebhookEndpoint> = webhook_endpoints::Entity::find()
            .filter(webhook_endpoints::Column::Id.is_in(endpoint_ids))
            .all(txn)
            .await
            .map_err(storage)?
            .into_iter()
            .map(|m| (m.id, convert::endpoint(m)))
            .collect();

        let mut out = Vec::with_capacity(claimed.len());
        let mut unreadable = Vec::new();
        for model in claimed {
            let id = model.id;
            let claim_token = model.claim_token;
            let endpoint = endpoints.get(&model.endpoint_id).cloned();
            match (claim_token, endpoint, convert::delivery(model)) {
                (Some(claim_token), Some(endpoint), Some(delivery)) => out.push(ClaimedDelivery {
                    delivery,
                    endpoint,
                    claim_token,
                }),
                _ => unreadable.push(id),
            }
        }

        // A bad row must not hold back the rest of the batch.
        if !unreadable.is_empty() {
            webhook_deliveries::Entity::update_many()
                .set(webhook_deliveries::ActiveModel {
                    status: Set(db::DeliveryStatus::Exhausted),
                    next_attempt_at: Set(None),
                    last_error: Set(Some(UNREADABLE_DELIVERY.to_string())),
                    claim_token: Set(None),
                    claimed_until: Set(None),
                    updated_at: Set(convert::fixed(now)),
                    ..Default::default()
                })
                .filter(webhook_deliveries::Column::Id.is_in(unreadable))
                .exec(txn)
                .await
                .map_err(storage)?;
        }

        rls.commit().await.map_err(storage)?;
        Ok(out)
    }

    async fn record_attempt(&self, record: AttemptRecord) -> Result<bool, WebhookError> {
        let rls = self.system().await?;
        let txn = rls.transaction();
        let delivery = &record.delivery;

        let active = convert::delivery_active(delivery);
        let result = webhook_deliveries::Entity::update_many()
            .set(webhook_deliveries::ActiveModel {
                attempts: active.attempts,
                status: active.status,
                next_attempt_at: active.next_attempt_at,
                last_error: active.last_error,
                last_status_code: active.last_status_code,
                delivered_at: active.delivered_at,
                claim_token: Set(None),
                claimed_until: Set(None),
                updated_at: active.updated_at,
                ..Default::default()
            })
            .filter(webhook_deliveries::Column::Id.eq(delivery.id))
            .filter(webhook_deliveries::Column::ClaimToken.eq(record.claim_token))
            .exec(txn)
            .await
            .map_err(storage)?;

        if result.rows_affected == 0 {
            rls.rollback().await.map_err(storage)?;
            return Ok(false);
        }

        if let Some(succeeded) = record.endpoint_success {
            let current = webhook_endpoints::Entity::find_by_id(delivery.endpoint_id)
                .lock_exclusive()
                .one(txn)
                .await
                .map_err(storage)?;
            if let Some(current) = current {
                let health = EndpointService::after_attempt(
                    EndpointHealth {
                        failure_count: u32::try_from(current.failure_count).unwrap_or(0),
                        is_active: current.is_active,
                    },
                    succeeded,
                    record.disable_after,
                );
                webhook_endpoints::Entity::update_many()
                    .set(webhook_endpoints::ActiveModel {
                        failure_count: Set(i32::try_from(health.failure_count).unwrap_or(i32::MAX)),
                        is_active: Set(health.is_active),
                        last_attempt_at: Set(Some(convert::fixed(delivery.updated_at))),
                        ..Default::default()
                    })
                    .filter(webhook_endpoints::Column::Id.eq(current.id))
                    .exec(txn)
                    .await
                    .map_err(storage)?;
            }
        }

        rls.commit().await.map_err(storage)?;
        Ok(true)
    }

    async fn deliveries(
        &self,
        company_id: Uuid,
        endpoint_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<WebhookDelivery>, WebhookError> {
        let rls = self.scoped(company_id).await?;
        let models = webhook_deliveries::Entity::find()
            .filter(webhook_deliveries::Column::CompanyId.eq(company_id))
            .filter(webhook_deliveries::Column::EndpointId.eq(endpoint_id))
            .order_by_desc(webhook_deliveries::Column::CreatedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;

        models
            .into_iter()
            .map(|m| {
                let id = m.id;
                convert::delivery(m).ok_or_else(|| unreadable(id))
            })
            .collect()
    }
}

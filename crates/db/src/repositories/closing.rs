//! Daily closing storage and the movement history it summarizes.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use merchant_shared::PageRequest;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, QuerySelect, SqlErr, Statement,
};
use uuid::Uuid;

use merchant_core::audit::AuditEntry;
use merchant_core::closing::{ClosingError, ClosingKey, ClosingStore, DailyClosing, LivePosition};
use merchant_core::ledger::{BalanceMovement, Provider};

use crate::convert;
use crate::entities::{
    balance_movements, daily_closings, sea_orm_active_enums as db,
};
use crate::repositories::audit;
use crate::rls::RlsConnection;

/// Balance and later movements from one statement, so both share a snapshot.
const LIVE_POSITION_SQL: &str = r"
SELECT
    b.balance AS balance,
    COALESCE((
        SELECT SUM(m.delta)
        FROM balance_movements m
        WHERE m.company_id = b.company_id
          AND m.branch_id = b.branch_id
          AND m.provider = b.provider
          AND m.created_at >= $4
    ), 0) AS moved_since
FROM provider_balances b
WHERE b.company_id = $1
  AND b.branch_id = $2
  AND b.provider = $3::provider_code
";

#[derive(Debug, FromQueryResult)]
struct LivePositionRow {
    balance: Decimal,
    moved_since: Decimal,
}

fn storage(e: DbErr) -> ClosingError {
    ClosingError::Storage(e.to_string())
}

/// `PostgreSQL` implementation of the closing port.
#[derive(Debug, Clone)]
pub struct ClosingRepository {
    db: DatabaseConnection,
}

impl ClosingRepository {
    /// Creates a new closing repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn scoped(&self, company_id: Uuid) -> Result<RlsConnection, ClosingError> {
        RlsConnection::new(&self.db, company_id)
            .await
            .map_err(storage)
    }
}

fn key_filter(key: ClosingKey) -> sea_orm::Select<daily_closings::Entity> {
    daily_closings::Entity::find()
        .filter(daily_closings::Column::CompanyId.eq(key.company_id))
        .filter(daily_closings::Column::BranchId.eq(key.branch_id))
        .filter(daily_closings::Column::Provider.eq(db::ProviderCode::from(key.provider)))
}

#[async_trait]
impl ClosingStore for ClosingRepository {
    async fn find(&self, key: ClosingKey) -> Result<Option<DailyClosing>, ClosingError> {
        let rls = self.scoped(key.company_id).await?;
        let model = key_filter(key)
            .filter(daily_closings::Column::Date.eq(key.date))
            .one(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;
        Ok(model.map(convert::closing))
    }

    async fn previous(&self, key: ClosingKey) -> Result<Option<DailyClosing>, ClosingError> {
        let rls = self.scoped(key.company_id).await?;
        let model = key_filter(key)
            .filter(daily_closings::Column::Date.lt(key.date))
            .order_by_desc(daily_closings::Column::Date)
            .one(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;
        Ok(model.map(convert::closing))
    }

    async fn movements(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
        provider: Provider,
        from: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<BalanceMovement>, ClosingError> {
        let rls = self.scoped(company_id).await?;

        let mut select = balance_movements::Entity::find()
            .filter(balance_movements::Column::CompanyId.eq(company_id))
            .filter(balance_movements::Column::BranchId.eq(branch_id))
            .filter(balance_movements::Column::Provider.eq(db::ProviderCode::from(provider)))
            .filter(balance_movements::Column::CreatedAt.lt(convert::fixed(until)));
        if let Some(from) = from {
            select = select.filter(balance_movements::Column::CreatedAt.gte(convert::fixed(from)));
        }

        let models = select
            .order_by_asc(balance_movements::Column::CreatedAt)
            .order_by_asc(balance_movements::Column::Seq)
            .all(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;

        Ok(models.into_iter().map(convert::movement).collect())
    }

    async fn live_position(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
        provider: Provider,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<LivePosition>, ClosingError> {
        let rls = self.scoped(company_id).await?;
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            LIVE_POSITION_SQL,
            [
                company_id.into(),
                branch_id.into(),
                provider.as_str().into(),
                convert::fixed(cutoff).into(),
            ],
        );
        let row = LivePositionRow::find_by_statement(stmt)
            .one(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;

        Ok(row.map(|r| LivePosition {
            balance: r.balance,
            moved_since: r.moved_since,
        }))
    }

    async fn save(
        &self,
        closing: DailyClosing,
        audit: AuditEntry,
        replace: bool,
    ) -> Result<DailyClosing, ClosingError> {
        let rls = self.scoped(closing.company_id).await?;
        let txn = rls.transaction();
        let active = convert::closing_active(&closing);

        let replaced = if replace {
            let key = ClosingKey {
                company_id: closing.company_id,
                branch_id: closing.branch_id,
                provider: closing.provider,
                date: closing.date,
            };
            daily_closings::Entity::update_many()
                .set(daily_closings::ActiveModel {
                    window_start: active.window_start.clone(),
                    window_end: active.window_end.clone(),
                    opening_balance: active.opening_balance.clone(),
                    closing_balance: active.closing_balance.clone(),
                    transaction_count: active.transaction_count.clone(),
                    live_balance: active.live_balance.clone(),
                    discrepancy: active.discrepancy.clone(),
                    recomputed_at: active.recomputed_at.clone(),
                    ..Default::default()
                })
                .filter(daily_closings::Column::CompanyId.eq(key.company_id))
                .filter(daily_closings::Column::BranchId.eq(key.branch_id))
                .filter(daily_closings::Column::Provider.eq(db::ProviderCode::from(key.provider)))
                .filter(daily_closings::Column::Date.eq(key.date))
                .exec(txn)
                .await
                .map_err(storage)?
                .rows_affected
                > 0
        } else {
            false
        };

        if !replaced {
            daily_closings::Entity::insert(active)
                .exec(txn)
                .await
                .map_err(|e| match e.sql_err() {
                    Some(SqlErr::UniqueConstraintViolation(_)) => {
                        ClosingError::AlreadyClosed(closing.date)
                    }
                    _ => storage(e),
                })?;
        }

        audit::append(txn, &audit).await.map_err(storage)?;
        rls.commit().await.map_err(storage)?;
        Ok(closing)
    }

    async fn list(
        &self,
        company_id: Uuid,
        date: Option<NaiveDate>,
        page: PageRequest,
    ) -> Result<Vec<DailyClosing>, ClosingError> {
        let rls = self.scoped(company_id).await?;

        let mut select = daily_closings::Entity::find()
            .filter(daily_closings::Column::CompanyId.eq(company_id));
        if let Some(date) = date {
            select = select.filter(daily_closings::Column::Date.eq(date));
        }

        let models = select
            .order_by_desc(daily_closings::Column::Date)
            .order_by_asc(daily_closings::Column::BranchId)
            .order_by_asc(daily_closings::Column::Provider)
            .offset(page.offset())
            .limit(page.limit())
            .all(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;

        Ok(models.into_iter().map(convert::closing).collect())
    }
}

//! Ledger storage: transactions, balance accounts, movements, reversals.
//!
//! A transition commits as one database transaction: a status-guarded
//! update of the transaction row, the conditional balance update, the
//! movement row, the reversal row, the audit entry and the outbox event.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr, Statement,
};
use uuid::Uuid;

use merchant_core::audit::AuditEntry;
use merchant_core::events::DomainEvent;
use merchant_core::ledger::{
    BalanceMovement, BalanceMutation, CommitReceipt, LedgerError, LedgerStore, Provider,
    ProviderBalance, ReversalRecord, Transaction, TransactionFilter, TransactionStatus,
    TransitionUnit,
};
use merchant_core::tenant::{Branch, Company};

use crate::convert;
use crate::entities::{
    balance_movements, branches, companies, provider_balances, reversals,
    sea_orm_active_enums as db, transactions,
};
use crate::repositories::{audit, webhook};
use crate::rls::RlsConnection;

const APPLY_DELTA_SQL: &str = r"
UPDATE provider_balances
SET balance = balance + $1, updated_at = $2
WHERE company_id = $3
  AND branch_id = $4
  AND provider = $5::provider_code
  AND ($6 OR balance + $1 >= 0)
RETURNING balance
";

fn storage(e: DbErr) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// `PostgreSQL` implementation of the ledger port.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    db: DatabaseConnection,
}

impl LedgerRepository {
    /// Creates a new ledger repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn scoped(&self, company_id: Uuid) -> Result<RlsConnection, LedgerError> {
        RlsConnection::new(&self.db, company_id)
            .await
            .map_err(storage)
    }

    async fn write_transaction(
        txn: &DatabaseTransaction,
        expected: Option<TransactionStatus>,
        tx: &Transaction,
    ) -> Result<(), LedgerError> {
        let mut active = convert::transaction_active(tx);

        let Some(expected) = expected else {
            transactions::Entity::insert(active)
                .exec(txn)
                .await
                .map_err(storage)?;
            return Ok(());
        };

        active.id = NotSet;
        active.company_id = NotSet;
        let expected: db::TransactionStatus = expected.into();
        let result = transactions::Entity::update_many()
            .set(active)
            .filter(transactions::Column::Id.eq(tx.id))
            .filter(transactions::Column::CompanyId.eq(tx.company_id))
            .filter(transactions::Column::Status.eq(expected))
            .exec(txn)
            .await
            .map_err(storage)?;

        if result.rows_affected == 0 {
            let current = transactions::Entity::find_by_id(tx.id)
                .filter(transactions::Column::CompanyId.eq(tx.company_id))
                .one(txn)
                .await
                .map_err(storage)?;
            return Err(match current {
                Some(_) => LedgerError::ConcurrentModification(tx.id),
                None => LedgerError::NotFound(tx.id),
            });
        }
        Ok(())
    }

    async fn apply_mutation(
        txn: &DatabaseTransaction,
        tx: &Transaction,
        mutation: BalanceMutation,
    ) -> Result<Decimal, LedgerError> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            APPLY_DELTA_SQL,
            [
                mutation.delta.into(),
                convert::fixed(tx.updated_at).into(),
                tx.company_id.into(),
                mutation.branch_id.into(),
                mutation.provider.as_str().into(),
                mutation.allow_overdraft.into(),
            ],
        );

        let row = txn.query_one(stmt).await.map_err(storage)?;
        let balance_after = match row {
            Some(row) => row.try_get::<Decimal>("", "balance").map_err(storage)?,
            None => {
                let account = provider_balances::Entity::find()
                    .filter(provider_balances::Column::CompanyId.eq(tx.company_id))
                    .filter(provider_balances::Column::BranchId.eq(mutation.branch_id))
                    .filter(provider_balances::Column::Provider.eq(db::ProviderCode::from(
                        mutation.provider,
                    )))
                    .one(txn)
                    .await
                    .map_err(storage)?;
                return Err(match account {
                    Some(account) => LedgerError::InsufficientBalance {
                        available: account.balance,
                        required: -mutation.delta,
                    },
                    None => LedgerError::Validation(format!(
                        "No {} balance account for branch {}",
                        mutation.provider, mutation.branch_id
                    )),
                });
            }
        };

        let movement = BalanceMovement {
            id: Uuid::new_v4(),
            company_id: tx.company_id,
            branch_id: mutation.branch_id,
            provider: mutation.provider,
            transaction_id: Some(tx.id),
            kind: mutation.kind,
            delta: mutation.delta,
            balance_after,
            created_at: tx.updated_at,
        };
        balance_movements::Entity::insert(convert::movement_active(&movement))
            .exec(txn)
            .await
            .map_err(storage)?;

        Ok(balance_after)
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    async fn company(&self, company_id: Uuid) -> Result<Option<Company>, LedgerError> {
        let rls = self.scoped(company_id).await?;
        let model = companies::Entity::find_by_id(company_id)
            .one(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;

        model
            .map(convert::company)
            .transpose()
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    async fn branch(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
    ) -> Result<Option<Branch>, LedgerError> {
        let rls = self.scoped(company_id).await?;
        let model = branches::Entity::find_by_id(branch_id)
            .filter(branches::Column::CompanyId.eq(company_id))
            .one(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;
        Ok(model.map(convert::branch))
    }

    async fn balance(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
        provider: Provider,
    ) -> Result<Option<ProviderBalance>, LedgerError> {
        let rls = self.scoped(company_id).await?;
        let model = provider_balances::Entity::find()
            .filter(provider_balances::Column::CompanyId.eq(company_id))
            .filter(provider_balances::Column::BranchId.eq(branch_id))
            .filter(provider_balances::Column::Provider.eq(db::ProviderCode::from(provider)))
            .one(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;
        Ok(model.map(convert::provider_balance))
    }

    async fn balances(&self, company_id: Uuid) -> Result<Vec<ProviderBalance>, LedgerError> {
        let rls = self.scoped(company_id).await?;
        let models = provider_balances::Entity::find()
            .filter(provider_balances::Column::CompanyId.eq(company_id))
            .order_by_asc(provider_balances::Column::BranchId)
            .order_by_asc(provider_balances::Column::Provider)
            .all(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;
        Ok(models.into_iter().map(convert::provider_balance).collect())
    }

    async fn open_balance(
        &self,
        balance: ProviderBalance,
        movement: BalanceMovement,
        audit: AuditEntry,
        event: &DomainEvent,
    ) -> Result<ProviderBalance, LedgerError> {
        let rls = self.scoped(balance.company_id).await?;
        let txn = rls.transaction();

        provider_balances::Entity::insert(convert::provider_balance_active(&balance))
            .exec(txn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LedgerError::DuplicateAccount
                } else {
                    storage(e)
                }
            })?;
        balance_movements::Entity::insert(convert::movement_active(&movement))
            .exec(txn)
            .await
            .map_err(storage)?;
        audit::append(txn, &audit).await.map_err(storage)?;
        webhook::append_event(txn, event).await.map_err(storage)?;

        rls.commit().await.map_err(storage)?;
        Ok(balance)
    }

    async fn transaction(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, LedgerError> {
        let rls = self.scoped(company_id).await?;
        let model = transactions::Entity::find_by_id(transaction_id)
            .filter(transactions::Column::CompanyId.eq(company_id))
            .one(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;
        Ok(model.map(convert::transaction))
    }

    async fn transactions(
        &self,
        company_id: Uuid,
        filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let rls = self.scoped(company_id).await?;

        let mut select =
            transactions::Entity::find().filter(transactions::Column::CompanyId.eq(company_id));
        if let Some(status) = filter.status {
            select = select.filter(transactions::Column::Status.eq(db::TransactionStatus::from(status)));
        }
        if let Some(channel) = filter.channel {
            select =
                select.filter(transactions::Column::Channel.eq(db::TransactionChannel::from(channel)));
        }
        if let Some(branch_id) = filter.branch_id {
            select = select.filter(transactions::Column::BranchId.eq(branch_id));
        }

        let models = select
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id)
            .offset(filter.page.offset())
            .limit(filter.page.limit())
            .all(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;

        Ok(models.into_iter().map(convert::transaction).collect())
    }

    async fn reversal(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<ReversalRecord>, LedgerError> {
        let rls = self.scoped(company_id).await?;
        let model = reversals::Entity::find()
            .filter(reversals::Column::CompanyId.eq(company_id))
            .filter(reversals::Column::OriginalTransactionId.eq(transaction_id))
            .one(rls.transaction())
            .await
            .map_err(storage)?;
        rls.commit().await.map_err(storage)?;
        Ok(model.map(convert::reversal))
    }

    async fn commit(&self, unit: TransitionUnit) -> Result<CommitReceipt, LedgerError> {
        let rls = self.scoped(unit.transaction.company_id).await?;
        let txn = rls.transaction();

        // Any early return drops `rls`, which rolls the whole unit back.
        Self::write_transaction(txn, unit.expected, &unit.transaction).await?;

        let balance_after = match unit.balance {
            Some(mutation) => Some(Self::apply_mutation(txn, &unit.transaction, mutation).await?),
            None => None,
        };

        if let Some(record) = &unit.reversal {
            reversals::Entity::insert(convert::reversal_active(record))
                .exec(txn)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        LedgerError::InvalidState {
                            status: TransactionStatus::Reversed,
                            action: "reverse",
                        }
                    } else {
                        storage(e)
                    }
                })?;
        }

        audit::append(txn, &unit.audit).await.map_err(storage)?;
        let event = DomainEvent::for_transaction(unit.event_type, &unit.transaction, balance_after);
        webhook::append_event(txn, &event).await.map_err(storage)?;
        rls.commit().await.map_err(storage)?;

        Ok(CommitReceipt {
            transaction: unit.transaction,
            balance_after,
            event,
        })
    }
}

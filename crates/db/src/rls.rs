//! Row-Level Security (RLS) context management.
//!
//! Every repository query runs inside a transaction that first pins the
//! tenant with `SET LOCAL app.current_company_id`. Background passes that
//! walk every tenant (membership lookup, webhook claiming, the closing
//! scheduler) use the system scope instead.
//!
//! # Usage
//!
//! ```ignore
//! use merchant_db::rls::RlsConnection;
//!
//! let rls = RlsConnection::new(&db, company_id).await?;
//! let rows = transactions::Entity::find().all(rls.transaction()).await?;
//! rls.commit().await?;
//! ```

use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use uuid::Uuid;

/// A database transaction with the RLS context already applied.
///
/// Dropping it without `commit` rolls the transaction back.
pub struct RlsConnection {
    txn: DatabaseTransaction,
}

impl RlsConnection {
    /// Begins a transaction scoped to one company.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started or the RLS
    /// context cannot be set.
    pub async fn new(db: &DatabaseConnection, company_id: Uuid) -> Result<Self, DbErr> {
        let txn = db.begin().await?;
        set_rls_context(&txn, company_id).await?;
        Ok(Self { txn })
    }

    /// Begins a transaction that sees every company.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started or the scope
    /// cannot be set.
    pub async fn system(db: &DatabaseConnection) -> Result<Self, DbErr> {
        let txn = db.begin().await?;
        txn.execute_unprepared(SYSTEM_SCOPE_SQL).await?;
        Ok(Self { txn })
    }

    /// Returns the underlying transaction for executing queries.
    #[must_use]
    pub fn transaction(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Commits the transaction, persisting all changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub async fn commit(self) -> Result<(), DbErr> {
        self.txn.commit().await
    }

    /// Rolls back the transaction, discarding all changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    pub async fn rollback(self) -> Result<(), DbErr> {
        self.txn.rollback().await
    }
}

const SYSTEM_SCOPE_SQL: &str = "SET LOCAL app.system_scope = 'on'";

fn company_scope_sql(company_id: Uuid) -> String {
    // A Uuid renders as hex and dashes only, so interpolation is safe.
    format!("SET LOCAL app.current_company_id = '{company_id}'")
}

/// Sets the company context on an existing transaction.
///
/// # Errors
///
/// Returns an error if the RLS context cannot be set.
pub async fn set_rls_context(txn: &DatabaseTransaction, company_id: Uuid) -> Result<(), DbErr> {
    txn.execute_unprepared(&company_scope_sql(company_id)).await?;
    Ok(())
}

//! Daily closing storage port.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use merchant_shared::PageRequest;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::closing::error::ClosingError;
use crate::closing::types::{ClosingKey, DailyClosing, LivePosition};
use crate::ledger::types::{BalanceMovement, Provider};

/// Persistence for closings and the movement history they summarize.
#[async_trait]
pub trait ClosingStore: Send + Sync {
    /// The closing for exactly this key.
    async fn find(&self, key: ClosingKey) -> Result<Option<DailyClosing>, ClosingError>;

    /// Latest closing of the account strictly before `key.date`.
    async fn previous(&self, key: ClosingKey) -> Result<Option<DailyClosing>, ClosingError>;

    /// Movements of one account with `from <= created_at < until`
    /// (`from = None` means since the account opened), in commit order.
    async fn movements(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
        provider: Provider,
        from: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<BalanceMovement>, ClosingError>;

    /// Live balance and the movements at or after `cutoff`, read together.
    /// `None` if the account does not exist.
    async fn live_position(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
        provider: Provider,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<LivePosition>, ClosingError>;

    /// Persist a closing with its audit entry.
    ///
    /// With `replace` false an existing row for the key fails with
    /// `AlreadyClosed`; with `replace` true the row's figures are overwritten.
    async fn save(
        &self,
        closing: DailyClosing,
        audit: AuditEntry,
        replace: bool,
    ) -> Result<DailyClosing, ClosingError>;

    /// Closings of a company, newest day first, optionally for one day.
    async fn list(
        &self,
        company_id: Uuid,
        date: Option<NaiveDate>,
        page: PageRequest,
    ) -> Result<Vec<DailyClosing>, ClosingError>;
}

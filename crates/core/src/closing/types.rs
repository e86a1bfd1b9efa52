//! Daily closing records.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::types::Provider;

/// End-of-day position of one balance account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyClosing {
    /// Closing ID.
    pub id: Uuid,
    /// Owning company.
    pub company_id: Uuid,
    /// Branch.
    pub branch_id: Uuid,
    /// Provider.
    pub provider: Provider,
    /// Local business day.
    pub date: NaiveDate,
    /// Window start (local midnight, as UTC).
    pub window_start: DateTime<Utc>,
    /// Window end (next local midnight, as UTC).
    pub window_end: DateTime<Utc>,
    /// Previous closing balance, or 0 for the first closing.
    pub opening_balance: Decimal,
    /// Opening plus every movement up to the window end.
    pub closing_balance: Decimal,
    /// Completions and reversals counted.
    pub transaction_count: u32,
    /// Live balance read at computation time.
    pub live_balance: Decimal,
    /// Live balance rolled back to the window end, minus the computed closing.
    pub discrepancy: Decimal,
    /// First computation time.
    pub created_at: DateTime<Utc>,
    /// Last forced recomputation.
    pub recomputed_at: Option<DateTime<Utc>>,
}

/// Account identity a closing is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosingKey {
    /// Owning company.
    pub company_id: Uuid,
    /// Branch.
    pub branch_id: Uuid,
    /// Provider.
    pub provider: Provider,
    /// Local business day.
    pub date: NaiveDate,
}

/// Live balance together with everything that moved it after a cutoff,
/// read in one consistent snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivePosition {
    /// Current balance.
    pub balance: Decimal,
    /// Sum of movement deltas at or after the cutoff.
    pub moved_since: Decimal,
}

//! Ledger domain types for the transaction lifecycle.
//!
//! This module defines the transaction entity, its status machine states,
//! and the provider balance accounts that completed transactions move.

use chrono::{DateTime, Utc};
use merchant_shared::PageRequest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transaction status in the lifecycle.
///
/// The valid transitions are:
/// - Pending → Approved (approve)
/// - Pending → Rejected (reject)
/// - Approved → Completed (complete)
/// - Approved → Failed (fail)
/// - Completed → Reversed (reverse)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Waiting for a manager decision.
    Pending,
    /// Cleared for completion.
    Approved,
    /// Declined by a manager (terminal).
    Rejected,
    /// Balance effect applied.
    Completed,
    /// Provider or system failure before completion (terminal).
    Failed,
    /// Balance effect negated (terminal).
    Reversed,
}

impl TransactionStatus {
    /// All statuses.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Completed,
        Self::Failed,
        Self::Reversed,
    ];

    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Reversed => "reversed",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "reversed" => Some(Self::Reversed),
            _ => None,
        }
    }

    /// Returns true if no transition leaves this status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Failed | Self::Reversed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Money-movement channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Bank deposit or withdrawal.
    Bank,
    /// Mobile-money network operation.
    MobileMoney,
    /// Over-the-counter cash.
    Cash,
}

impl Channel {
    /// All channels.
    pub const ALL: [Self; 3] = [Self::Bank, Self::MobileMoney, Self::Cash];

    /// Returns the string representation of the channel.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::MobileMoney => "mobile_money",
            Self::Cash => "cash",
        }
    }

    /// Parses a channel from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bank" => Some(Self::Bank),
            "mobile_money" => Some(Self::MobileMoney),
            "cash" => Some(Self::Cash),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of money relative to the provider account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Money into the account (balance goes up).
    In,
    /// Money out of the account (balance goes down).
    Out,
}

impl Direction {
    /// Returns the string representation of the direction.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }

    /// Parses a direction from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "in" => Some(Self::In),
            "out" => Some(Self::Out),
            _ => None,
        }
    }
}

/// Float provider whose balance a transaction moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// MTN mobile money.
    Mtn,
    /// Vodafone cash.
    Vodafone,
    /// Airtel money.
    Airtel,
    /// Tigo cash.
    Tigo,
    /// Ecobank.
    Ecobank,
    /// Fidelity Bank.
    Fidelity,
    /// CAL Bank.
    CalBank,
    /// Branch cash drawer.
    Cash,
}

impl Provider {
    /// All providers.
    pub const ALL: [Self; 8] = [
        Self::Mtn,
        Self::Vodafone,
        Self::Airtel,
        Self::Tigo,
        Self::Ecobank,
        Self::Fidelity,
        Self::CalBank,
        Self::Cash,
    ];

    /// Returns the string representation of the provider.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mtn => "mtn",
            Self::Vodafone => "vodafone",
            Self::Airtel => "airtel",
            Self::Tigo => "tigo",
            Self::Ecobank => "ecobank",
            Self::Fidelity => "fidelity",
            Self::CalBank => "cal_bank",
            Self::Cash => "cash",
        }
    }

    /// Parses a provider from a string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
    }

    /// The only channel this provider serves.
    #[must_use]
    pub const fn channel(self) -> Channel {
        match self {
            Self::Mtn | Self::Vodafone | Self::Airtel | Self::Tigo => Channel::MobileMoney,
            Self::Ecobank | Self::Fidelity | Self::CalBank => Channel::Bank,
            Self::Cash => Channel::Cash,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creation payload for a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Branch that records the transaction.
    pub branch_id: Uuid,
    /// Channel.
    pub channel: Channel,
    /// Direction relative to the provider account.
    pub direction: Direction,
    /// Provider account to move.
    pub provider: Provider,
    /// Gross amount (must be positive).
    pub amount: Decimal,
    /// Customer reference from the CRUD layer.
    pub customer_ref: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
}

/// The central ledger entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID.
    pub id: Uuid,
    /// Owning company.
    pub company_id: Uuid,
    /// Recording branch.
    pub branch_id: Uuid,
    /// Human-facing reference, `TXN-<millis>-<nnn>`.
    pub reference: String,
    /// Channel.
    pub channel: Channel,
    /// Direction.
    pub direction: Direction,
    /// Provider account.
    pub provider: Provider,
    /// Gross amount.
    pub amount: Decimal,
    /// Fee charged.
    pub fee: Decimal,
    /// Amount after fee.
    pub net_amount: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// Customer reference.
    pub customer_ref: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Initiating membership.
    pub initiated_by: Uuid,
    /// Current status.
    pub status: TransactionStatus,
    /// Whether the amount exceeded the company threshold at creation.
    pub requires_approval: bool,
    /// Approving membership; `None` for auto-approval.
    pub approved_by: Option<Uuid>,
    /// Approval time.
    pub approved_at: Option<DateTime<Utc>>,
    /// Reason given on rejection.
    pub rejection_reason: Option<String>,
    /// Reason recorded on failure.
    pub failure_reason: Option<String>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Reversing membership.
    pub reversed_by: Option<Uuid>,
    /// Reversal time.
    pub reversed_at: Option<DateTime<Utc>>,
    /// Reason given on reversal.
    pub reversal_reason: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

/// Running balance of one provider account at one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderBalance {
    /// Account ID.
    pub id: Uuid,
    /// Owning company.
    pub company_id: Uuid,
    /// Branch.
    pub branch_id: Uuid,
    /// Provider.
    pub provider: Provider,
    /// Balance when the account was opened.
    pub starting_balance: Decimal,
    /// Live balance.
    pub balance: Decimal,
    /// Opening time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Why a balance moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Account opened with a starting balance.
    Opening,
    /// A transaction completed.
    Completion,
    /// A completed transaction was reversed.
    Reversal,
}

impl MovementKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Completion => "completion",
            Self::Reversal => "reversal",
        }
    }

    /// Returns true for movements caused by a transaction.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        matches!(self, Self::Completion | Self::Reversal)
    }
}

/// One applied balance change, written in the same unit as the change itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMovement {
    /// Movement ID.
    pub id: Uuid,
    /// Owning company.
    pub company_id: Uuid,
    /// Branch.
    pub branch_id: Uuid,
    /// Provider.
    pub provider: Provider,
    /// Causing transaction, if any.
    pub transaction_id: Option<Uuid>,
    /// Cause.
    pub kind: MovementKind,
    /// Signed change.
    pub delta: Decimal,
    /// Balance right after the change.
    pub balance_after: Decimal,
    /// When the change committed.
    pub created_at: DateTime<Utc>,
}

/// Record that a completed transaction was reversed. At most one per original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalRecord {
    /// Record ID.
    pub id: Uuid,
    /// Owning company.
    pub company_id: Uuid,
    /// The reversed transaction.
    pub original_transaction_id: Uuid,
    /// Reversing membership.
    pub reversed_by: Uuid,
    /// Reason given.
    pub reason: Option<String>,
    /// Balance change applied (negation of the completion delta).
    pub delta: Decimal,
    /// Reversal time.
    pub created_at: DateTime<Utc>,
}

/// List filter for transactions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionFilter {
    /// Only this status.
    pub status: Option<TransactionStatus>,
    /// Only this channel.
    pub channel: Option<Channel>,
    /// Only this branch.
    pub branch_id: Option<Uuid>,
    /// Page window.
    pub page: PageRequest,
}

impl TransactionFilter {
    /// Returns true if `tx` passes every set criterion.
    #[must_use]
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.status.is_none_or(|s| tx.status == s)
            && self.channel.is_none_or(|c| tx.channel == c)
            && self.branch_id.is_none_or(|b| tx.branch_id == b)
    }
}

//! Ledger storage port.
//!
//! A transition reaches storage as one `TransitionUnit`: the new transaction
//! state, its status precondition, an optional balance mutation, an optional
//! reversal record, the audit entry, and the event announcing it, which is
//! written to the event outbox. Implementations apply all of it or none of it.

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::events::{DomainEvent, EventType};
use crate::ledger::error::LedgerError;
use crate::ledger::types::{
    BalanceMovement, MovementKind, Provider, ProviderBalance, ReversalRecord, Transaction,
    TransactionFilter, TransactionStatus,
};
use crate::tenant::{Branch, Company};

/// Balance change applied inside a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceMutation {
    /// Account branch.
    pub branch_id: Uuid,
    /// Account provider.
    pub provider: Provider,
    /// Signed change.
    pub delta: Decimal,
    /// Cause recorded on the movement.
    pub kind: MovementKind,
    /// Whether the account may go negative.
    pub allow_overdraft: bool,
}

/// Everything one transition writes.
#[derive(Debug, Clone)]
pub struct TransitionUnit {
    /// Status the stored row must still have; `None` inserts a new row.
    pub expected: Option<TransactionStatus>,
    /// New transaction state.
    pub transaction: Transaction,
    /// Balance change, for completion and reversal.
    pub balance: Option<BalanceMutation>,
    /// Reversal record, for reversal.
    pub reversal: Option<ReversalRecord>,
    /// Audit entry for the transition.
    pub audit: AuditEntry,
    /// Event recorded in the outbox for the committed state.
    pub event_type: EventType,
}

/// What a committed transition produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Stored transaction state.
    pub transaction: Transaction,
    /// Account balance right after the mutation, if one was applied.
    pub balance_after: Option<Decimal>,
    /// Event stored in the outbox by the same commit.
    pub event: DomainEvent,
}

/// Tenant-scoped persistence for the ledger.
///
/// Every read takes the company and never returns another company's rows.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Company with its settings.
    async fn company(&self, company_id: Uuid) -> Result<Option<Company>, LedgerError>;

    /// Branch of a company.
    async fn branch(&self, company_id: Uuid, branch_id: Uuid)
    -> Result<Option<Branch>, LedgerError>;

    /// One balance account.
    async fn balance(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
        provider: Provider,
    ) -> Result<Option<ProviderBalance>, LedgerError>;

    /// All balance accounts of a company.
    async fn balances(&self, company_id: Uuid) -> Result<Vec<ProviderBalance>, LedgerError>;

    /// Open a balance account together with its opening movement, audit
    /// entry, and outbox event.
    ///
    /// # Errors
    /// * `DuplicateAccount` if the `(branch, provider)` account exists
    async fn open_balance(
        &self,
        balance: ProviderBalance,
        movement: BalanceMovement,
        audit: AuditEntry,
        event: &DomainEvent,
    ) -> Result<ProviderBalance, LedgerError>;

    /// One transaction.
    async fn transaction(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, LedgerError>;

    /// Transactions matching a filter, newest first.
    async fn transactions(
        &self,
        company_id: Uuid,
        filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError>;

    /// Reversal record of a transaction.
    async fn reversal(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<ReversalRecord>, LedgerError>;

    /// Apply a transition atomically.
    ///
    /// # Errors
    /// * `ConcurrentModification` if the stored status is no longer `expected`
    /// * `NotFound` if the transaction row is missing
    /// * `Validation` if the balance account is missing
    /// * `InsufficientBalance` if the mutation would go negative without overdraft
    /// * `InvalidState` if a reversal for the transaction already exists
    async fn commit(&self, unit: TransitionUnit) -> Result<CommitReceipt, LedgerError>;
}

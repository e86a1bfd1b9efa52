//! Ledger orchestration.
//!
//! `LedgerEngine` loads the current state through the tenant-scoped store,
//! asks `LedgerService` for the next state, commits the transition unit
//! together with its outbox event, and publishes that event once the commit
//! succeeded. Commit and
//! publish for one transaction happen under a striped lock so that every sink
//! sees a transaction's events in commit order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use merchant_core::audit::{AuditAction, AuditRecorder, EntityType};
use merchant_core::events::{DomainEvent, EventType};
use merchant_core::ledger::{
    BalanceMovement, BalanceMutation, CommitReceipt, Completion, LedgerError, LedgerService,
    LedgerStore, MovementKind, NewTransaction, Provider, ProviderBalance, ReversalRecord,
    Transaction, TransactionFilter, TransactionStatus, TransitionUnit,
};
use merchant_core::tenant::{Actor, Company, Role, TenantContext};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::bus::EventBus;

const LOCK_STRIPES: u128 = 64;

/// Request to open a balance account.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBalance {
    /// Branch of the account.
    pub branch_id: Uuid,
    /// Provider of the account.
    pub provider: Provider,
    /// Opening float.
    pub starting_balance: Decimal,
}

/// Runs ledger transitions end to end.
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    bus: Arc<EventBus>,
    locks: Vec<Mutex<()>>,
}

impl LedgerEngine {
    /// Creates an engine over a store and bus.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Create a transaction.
    ///
    /// Auto-approved transactions are completed right away as a second,
    /// separately audited step. If that completion fails the transaction
    /// stays `approved` and is returned as such.
    #[instrument(skip(self, ctx, input), fields(company_id = %ctx.company_id()))]
    pub async fn create(
        &self,
        ctx: &TenantContext,
        input: NewTransaction,
    ) -> Result<Transaction, LedgerError> {
        let company = self.company(ctx.company_id()).await?;
        let branch = self.store.branch(company.id, input.branch_id).await?;
        let account = self
            .store
            .balance(company.id, input.branch_id, input.provider)
            .await?;
        LedgerService::validate_new(&company, branch.as_ref(), &input, account.as_ref())?;

        let now = Utc::now();
        let tx = LedgerService::build(ctx, &company, input, now)?;
        let audit = AuditRecorder::record(
            company.id,
            ctx.actor(),
            AuditAction::Create,
            (EntityType::Transaction, tx.id),
            None,
            Some(&tx),
            now,
        )?;

        let _guard = self.lock(tx.id).await;
        let receipt = self
            .store
            .commit(TransitionUnit {
                expected: None,
                transaction: tx,
                balance: None,
                reversal: None,
                audit,
                event_type: EventType::TransactionCreated,
            })
            .await?;
        let created = self.announce(receipt);

        if created.status != TransactionStatus::Approved {
            return Ok(created);
        }

        match self.apply_completion(&company, &created, ctx.actor()).await {
            Ok(completed) => Ok(completed),
            Err(err) => {
                warn!(
                    transaction_id = %created.id,
                    error = %err,
                    "Auto-completion failed, transaction left approved"
                );
                Ok(created)
            }
        }
    }

    /// Approve a pending transaction.
    #[instrument(skip(self, ctx), fields(company_id = %ctx.company_id()))]
    pub async fn approve(
        &self,
        ctx: &TenantContext,
        transaction_id: Uuid,
    ) -> Result<Transaction, LedgerError> {
        let company = self.company(ctx.company_id()).await?;
        let _guard = self.lock(transaction_id).await;
        let tx = self.load(company.id, transaction_id).await?;

        let now = Utc::now();
        let next = LedgerService::approve(&tx, ctx.actor(), &company.settings, now)?;
        self.transition(&tx, next, ctx.actor(), AuditAction::Approve, None, now)
            .await
    }

    /// Reject a pending transaction.
    #[instrument(skip(self, ctx, reason), fields(company_id = %ctx.company_id()))]
    pub async fn reject(
        &self,
        ctx: &TenantContext,
        transaction_id: Uuid,
        reason: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let company = self.company(ctx.company_id()).await?;
        let _guard = self.lock(transaction_id).await;
        let tx = self.load(company.id, transaction_id).await?;

        let now = Utc::now();
        let next = LedgerService::reject(&tx, ctx.actor(), reason, now)?;
        self.transition(&tx, next, ctx.actor(), AuditAction::Reject, None, now)
            .await
    }

    /// Complete an approved transaction. Completing a completed transaction
    /// returns it unchanged.
    #[instrument(skip(self, ctx), fields(company_id = %ctx.company_id()))]
    pub async fn complete(
        &self,
        ctx: &TenantContext,
        transaction_id: Uuid,
    ) -> Result<Transaction, LedgerError> {
        let company = self.company(ctx.company_id()).await?;
        let _guard = self.lock(transaction_id).await;
        let tx = self.load(company.id, transaction_id).await?;
        self.apply_completion(&company, &tx, ctx.actor()).await
    }

    /// Reverse a completed transaction, at most once.
    #[instrument(skip(self, ctx, reason), fields(company_id = %ctx.company_id()))]
    pub async fn reverse(
        &self,
        ctx: &TenantContext,
        transaction_id: Uuid,
        reason: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let company = self.company(ctx.company_id()).await?;
        let _guard = self.lock(transaction_id).await;
        let tx = self.load(company.id, transaction_id).await?;

        let now = Utc::now();
        let (next, record) = LedgerService::reverse(&tx, ctx.actor(), reason, now)?;
        let mutation = BalanceMutation {
            branch_id: tx.branch_id,
            provider: tx.provider,
            delta: record.delta,
            kind: MovementKind::Reversal,
            allow_overdraft: company.settings.allow_overdraft,
        };
        let audit = AuditRecorder::record(
            company.id,
            ctx.actor(),
            AuditAction::Reverse,
            (EntityType::Transaction, tx.id),
            Some(&tx),
            Some(&next),
            now,
        )?;
        let receipt = self
            .store
            .commit(TransitionUnit {
                expected: Some(tx.status),
                transaction: next,
                balance: Some(mutation),
                reversal: Some(record),
                audit,
                event_type: EventType::TransactionReversed,
            })
            .await?;
        Ok(self.announce(receipt))
    }

    /// Mark an approved transaction failed on behalf of a member (admin+).
    #[instrument(skip(self, ctx, reason), fields(company_id = %ctx.company_id()))]
    pub async fn fail(
        &self,
        ctx: &TenantContext,
        transaction_id: Uuid,
        reason: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        self.fail_as(ctx.company_id(), ctx.actor(), transaction_id, reason)
            .await
    }

    /// Mark an approved transaction failed from a provider callback.
    #[instrument(skip(self, reason))]
    pub async fn fail_from_provider(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
        reason: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        self.fail_as(company_id, Actor::System, transaction_id, reason)
            .await
    }

    /// One transaction of the caller's company.
    pub async fn get(
        &self,
        ctx: &TenantContext,
        transaction_id: Uuid,
    ) -> Result<Transaction, LedgerError> {
        self.load(ctx.company_id(), transaction_id).await
    }

    /// Transactions of the caller's company, newest first.
    pub async fn list(
        &self,
        ctx: &TenantContext,
        filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.store.transactions(ctx.company_id(), filter).await
    }

    /// Balance accounts of the caller's company.
    pub async fn balances(&self, ctx: &TenantContext) -> Result<Vec<ProviderBalance>, LedgerError> {
        self.store.balances(ctx.company_id()).await
    }

    /// Reversal record of a transaction, if it was reversed.
    pub async fn reversal(
        &self,
        ctx: &TenantContext,
        transaction_id: Uuid,
    ) -> Result<Option<ReversalRecord>, LedgerError> {
        let tx = self.load(ctx.company_id(), transaction_id).await?;
        self.store.reversal(tx.company_id, tx.id).await
    }

    /// Open a balance account with its starting float (admin+).
    #[instrument(skip(self, ctx, input), fields(company_id = %ctx.company_id()))]
    pub async fn open_balance(
        &self,
        ctx: &TenantContext,
        input: NewBalance,
    ) -> Result<ProviderBalance, LedgerError> {
        if !ctx.role().at_least(Role::Admin) {
            return Err(LedgerError::InsufficientRole {
                role: ctx.role(),
                required: Role::Admin,
            });
        }
        if input.starting_balance < Decimal::ZERO
            || input.starting_balance.normalize().scale() > 2
        {
            return Err(LedgerError::Validation(
                "starting balance must be non-negative with at most 2 decimal places".into(),
            ));
        }
        let company = self.company(ctx.company_id()).await?;
        if self
            .store
            .branch(company.id, input.branch_id)
            .await?
            .is_none()
        {
            return Err(LedgerError::Validation(format!(
                "branch {} not found",
                input.branch_id
            )));
        }

        let now = Utc::now();
        let balance = ProviderBalance {
            id: Uuid::new_v4(),
            company_id: company.id,
            branch_id: input.branch_id,
            provider: input.provider,
            starting_balance: input.starting_balance,
            balance: input.starting_balance,
            created_at: now,
            updated_at: now,
        };
        let movement = BalanceMovement {
            id: Uuid::new_v4(),
            company_id: company.id,
            branch_id: input.branch_id,
            provider: input.provider,
            transaction_id: None,
            kind: MovementKind::Opening,
            delta: input.starting_balance,
            balance_after: input.starting_balance,
            created_at: now,
        };
        let audit = AuditRecorder::record(
            company.id,
            ctx.actor(),
            AuditAction::OpenBalance,
            (EntityType::ProviderBalance, balance.id),
            None,
            Some(&balance),
            now,
        )?;

        let event = DomainEvent::new(
            EventType::BalanceChanged,
            balance.company_id,
            balance.id,
            json!({ "balance": balance, "cause": MovementKind::Opening }),
            now,
        );

        let opened = self
            .store
            .open_balance(balance, movement, audit, &event)
            .await?;
        info!(
            branch_id = %opened.branch_id,
            provider = %opened.provider,
            balance = %opened.balance,
            "Balance account opened"
        );
        self.bus.publish(event);
        Ok(opened)
    }

    async fn fail_as(
        &self,
        company_id: Uuid,
        actor: Actor,
        transaction_id: Uuid,
        reason: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let company = self.company(company_id).await?;
        let _guard = self.lock(transaction_id).await;
        let tx = self.load(company.id, transaction_id).await?;

        let now = Utc::now();
        let next = LedgerService::fail(&tx, actor, reason, now)?;
        self.transition(&tx, next, actor, AuditAction::Fail, None, now)
            .await
    }

    /// Completion with the caller already holding the transaction's lock.
    async fn apply_completion(
        &self,
        company: &Company,
        tx: &Transaction,
        actor: Actor,
    ) -> Result<Transaction, LedgerError> {
        let now = Utc::now();
        let next = match LedgerService::complete(tx, actor, now)? {
            Completion::AlreadyCompleted => return Ok(tx.clone()),
            Completion::Apply(next) => next,
        };
        let mutation = BalanceMutation {
            branch_id: tx.branch_id,
            provider: tx.provider,
            delta: LedgerService::balance_delta(tx),
            kind: MovementKind::Completion,
            allow_overdraft: company.settings.allow_overdraft,
        };

        match self
            .transition(tx, next, actor, AuditAction::Complete, Some(mutation), now)
            .await
        {
            Err(LedgerError::ConcurrentModification(id)) => {
                let current = self.load(company.id, id).await?;
                if current.status == TransactionStatus::Completed {
                    Ok(current)
                } else {
                    Err(LedgerError::ConcurrentModification(id))
                }
            }
            other => other,
        }
    }

    /// Commit a status change and publish its event.
    async fn transition(
        &self,
        before: &Transaction,
        next: Transaction,
        actor: Actor,
        action: AuditAction,
        balance: Option<BalanceMutation>,
        now: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        let audit = AuditRecorder::record(
            before.company_id,
            actor,
            action,
            (EntityType::Transaction, before.id),
            Some(before),
            Some(&next),
            now,
        )?;
        let receipt = self
            .store
            .commit(TransitionUnit {
                expected: Some(before.status),
                transaction: next,
                balance,
                reversal: None,
                audit,
                event_type: event_for(action),
            })
            .await
            .inspect_err(|err| {
                if err.is_retryable() {
                    warn!(transaction_id = %before.id, action = %action, "Status changed underneath transition");
                }
            })?;
        Ok(self.announce(receipt))
    }

    fn announce(&self, receipt: CommitReceipt) -> Transaction {
        let CommitReceipt {
            transaction, event, ..
        } = receipt;
        info!(
            transaction_id = %transaction.id,
            status = %transaction.status,
            event_type = %event.event_type,
            "Transaction transition committed"
        );
        self.bus.publish(event);
        transaction
    }

    async fn company(&self, company_id: Uuid) -> Result<Company, LedgerError> {
        self.store
            .company(company_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| LedgerError::Unauthorized(format!("company {company_id} is not active")))
    }

    async fn load(&self, company_id: Uuid, transaction_id: Uuid) -> Result<Transaction, LedgerError> {
        self.store
            .transaction(company_id, transaction_id)
            .await?
            .ok_or(LedgerError::NotFound(transaction_id))
    }

    async fn lock(&self, transaction_id: Uuid) -> MutexGuard<'_, ()> {
        let stripe = usize::try_from(transaction_id.as_u128() % LOCK_STRIPES).unwrap_or(0);
        self.locks[stripe].lock().await
    }
}

const fn event_for(action: AuditAction) -> EventType {
    match action {
        AuditAction::Approve => EventType::TransactionApproved,
        AuditAction::Reject => EventType::TransactionRejected,
        AuditAction::Complete => EventType::TransactionCompleted,
        AuditAction::Reverse => EventType::TransactionReversed,
        AuditAction::Fail => EventType::TransactionFailed,
        _ => EventType::TransactionCreated,
    }
}

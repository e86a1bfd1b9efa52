//! In-memory implementation of every storage port.
//!
//! One mutex guards the whole state, so each port call is atomic and
//! isolated exactly like a database transaction: every precondition is
//! checked before anything is written. Used by tests and local runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use merchant_core::audit::{AuditEntry, AuditError, AuditLog, AuditQuery};
use merchant_core::closing::{ClosingError, ClosingKey, ClosingStore, DailyClosing, LivePosition};
use merchant_core::events::DomainEvent;
use merchant_core::ledger::{
    BalanceMovement, CommitReceipt, LedgerError, LedgerStore, MovementKind, Provider,
    ProviderBalance, ReversalRecord, Transaction, TransactionFilter, TransactionStatus,
    TransitionUnit,
};
use merchant_core::tenant::{Branch, Company, Membership, TenantDirectory, TenantError};
use merchant_core::webhook::{
    AttemptRecord, ClaimedDelivery, DeliveryStatus, EndpointHealth, EndpointService,
    WebhookDelivery, WebhookEndpoint, WebhookError, WebhookStore,
};
use merchant_shared::PageRequest;
use rust_decimal::Decimal;
use uuid::Uuid;

type AccountKey = (Uuid, Uuid, Provider);

struct Claim {
    token: Uuid,
    until: DateTime<Utc>,
}

struct QueuedDelivery {
    delivery: WebhookDelivery,
    claim: Option<Claim>,
}

struct OutboxRow {
    event: DomainEvent,
    fanned_out: bool,
}

#[derive(Default)]
struct State {
    companies: HashMap<Uuid, Company>,
    branches: HashMap<Uuid, Branch>,
    memberships: Vec<Membership>,
    balances: HashMap<AccountKey, ProviderBalance>,
    movements: Vec<BalanceMovement>,
    transactions: HashMap<Uuid, Transaction>,
    reversals: HashMap<Uuid, ReversalRecord>,
    audit: Vec<AuditEntry>,
    audit_sequences: HashMap<Uuid, i64>,
    endpoints: HashMap<Uuid, WebhookEndpoint>,
    deliveries: Vec<QueuedDelivery>,
    outbox: Vec<OutboxRow>,
    closings: HashMap<ClosingKey, DailyClosing>,
}

impl State {
    fn append_audit(&mut self, mut entry: AuditEntry) {
        let sequence = self.audit_sequences.entry(entry.company_id).or_insert(0);
        *sequence += 1;
        entry.sequence = *sequence;
        self.audit.push(entry);
    }

    fn record_event(&mut self, event: DomainEvent) {
        if self.outbox.iter().all(|row| row.event.id != event.id) {
            self.outbox.push(OutboxRow {
                event,
                fanned_out: false,
            });
        }
    }

    fn movement(
        &mut self,
        tx: &Transaction,
        kind: MovementKind,
        delta: Decimal,
        balance_after: Decimal,
    ) {
        self.movements.push(BalanceMovement {
            id: Uuid::new_v4(),
            company_id: tx.company_id,
            branch_id: tx.branch_id,
            provider: tx.provider,
            transaction_id: Some(tx.id),
            kind,
            delta,
            balance_after,
            created_at: tx.updated_at,
        });
    }
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a company.
    pub fn add_company(&self, company: Company) {
        self.lock().companies.insert(company.id, company);
    }

    /// Insert or replace a branch.
    pub fn add_branch(&self, branch: Branch) {
        self.lock().branches.insert(branch.id, branch);
    }

    /// Add a membership.
    pub fn add_membership(&self, membership: Membership) {
        self.lock().memberships.push(membership);
    }

    /// Suspend or reactivate a company.
    pub fn set_company_active(&self, company_id: Uuid, active: bool) {
        if let Some(company) = self.lock().companies.get_mut(&company_id) {
            company.is_active = active;
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn page<T>(items: impl Iterator<Item = T>, page: PageRequest) -> Vec<T> {
    items
        .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
        .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
        .collect()
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn company(&self, company_id: Uuid) -> Result<Option<Company>, LedgerError> {
        Ok(self.lock().companies.get(&company_id).cloned())
    }

    async fn branch(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
    ) -> Result<Option<Branch>, LedgerError> {
        Ok(self
            .lock()
            .branches
            .get(&branch_id)
            .filter(|b| b.company_id == company_id)
            .cloned())
    }

    async fn balance(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
        provider: Provider,
    ) -> Result<Option<ProviderBalance>, LedgerError> {
        Ok(self
            .lock()
            .balances
            .get(&(company_id, branch_id, provider))
            .cloned())
    }

    async fn balances(&self, company_id: Uuid) -> Result<Vec<ProviderBalance>, LedgerError> {
        let mut balances: Vec<ProviderBalance> = self
            .lock()
            .balances
            .values()
            .filter(|b| b.company_id == company_id)
            .cloned()
            .collect();
        balances.sort_by_key(|b| (b.branch_id, b.provider));
        Ok(balances)
    }

    async fn open_balance(
        &self,
        balance: ProviderBalance,
        movement: BalanceMovement,
        audit: AuditEntry,
        event: &DomainEvent,
    ) -> Result<ProviderBalance, LedgerError> {
        let mut state = self.lock();
        let key = (balance.company_id, balance.branch_id, balance.provider);
        if state.balances.contains_key(&key) {
            return Err(LedgerError::DuplicateAccount);
        }
        state.balances.insert(key, balance.clone());
        state.movements.push(movement);
        state.append_audit(audit);
        state.record_event(event.clone());
        Ok(balance)
    }

    async fn transaction(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, LedgerError> {
        Ok(self
            .lock()
            .transactions
            .get(&transaction_id)
            .filter(|t| t.company_id == company_id)
            .cloned())
    }

    async fn transactions(
        &self,
        company_id: Uuid,
        filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let mut found: Vec<Transaction> = self
            .lock()
            .transactions
            .values()
            .filter(|t| t.company_id == company_id && filter.matches(t))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(found.into_iter(), filter.page))
    }

    async fn reversal(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<ReversalRecord>, LedgerError> {
        Ok(self
            .lock()
            .reversals
            .get(&transaction_id)
            .filter(|r| r.company_id == company_id)
            .cloned())
    }

    async fn commit(&self, unit: TransitionUnit) -> Result<CommitReceipt, LedgerError> {
        let mut state = self.lock();
        let tx = unit.transaction;

        match unit.expected {
            None if state.transactions.contains_key(&tx.id) => {
                return Err(LedgerError::Storage(format!(
                    "transaction {} already exists",
                    tx.id
                )));
            }
            None => {}
            Some(expected) => {
                let current = state
                    .transactions
                    .get(&tx.id)
                    .filter(|t| t.company_id == tx.company_id)
                    .ok_or(LedgerError::NotFound(tx.id))?;
                if current.status != expected {
                    return Err(LedgerError::ConcurrentModification(tx.id));
                }
            }
        }

        if unit.reversal.is_some() && state.reversals.contains_key(&tx.id) {
            return Err(LedgerError::InvalidState {
                status: TransactionStatus::Reversed,
                action: "reverse",
            });
        }

        let balance_after = match unit.balance {
            Some(mutation) => {
                let key = (tx.company_id, mutation.branch_id, mutation.provider);
                let account = state.balances.get_mut(&key).ok_or_else(|| {
                    LedgerError::Validation(format!(
                        "no {} balance account is open at branch {}",
                        mutation.provider, mutation.branch_id
                    ))
                })?;
                let next = account.balance + mutation.delta;
                if !mutation.allow_overdraft && next < Decimal::ZERO {
                    return Err(LedgerError::InsufficientBalance {
                        available: account.balance,
                        required: -mutation.delta,
                    });
                }
                account.balance = next;
                account.updated_at = tx.updated_at;
                state.movement(&tx, mutation.kind, mutation.delta, next);
                Some(next)
            }
            None => None,
        };

        if let Some(reversal) = unit.reversal {
            state
                .reversals
                .insert(reversal.original_transaction_id, reversal);
        }
        state.append_audit(unit.audit);
        let event = DomainEvent::for_transaction(unit.event_type, &tx, balance_after);
        state.record_event(event.clone());
        state.transactions.insert(tx.id, tx.clone());

        Ok(CommitReceipt {
            transaction: tx,
            balance_after,
            event,
        })
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn entries(
        &self,
        company_id: Uuid,
        query: AuditQuery,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let state = self.lock();
        let entries = state
            .audit
            .iter()
            .filter(|e| e.company_id == company_id)
            .filter(|e| query.entity_id.is_none_or(|id| e.entity_id == id))
            .cloned();
        Ok(page(entries, query.page))
    }
}

#[async_trait]
impl TenantDirectory for MemoryStore {
    async fn memberships_for_user(&self, user_id: Uuid) -> Result<Vec<Membership>, TenantError> {
        let state = self.lock();
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| Membership {
                company_active: state
                    .companies
                    .get(&m.company_id)
                    .is_some_and(|c| c.is_active),
                ..m.clone()
            })
            .collect())
    }

    async fn active_companies(&self) -> Result<Vec<Company>, TenantError> {
        let mut companies: Vec<Company> = self
            .lock()
            .companies
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        companies.sort_by_key(|c| c.created_at);
        Ok(companies)
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn endpoints(&self, company_id: Uuid) -> Result<Vec<WebhookEndpoint>, WebhookError> {
        let mut endpoints: Vec<WebhookEndpoint> = self
            .lock()
            .endpoints
            .values()
            .filter(|e| e.company_id == company_id)
            .cloned()
            .collect();
        endpoints.sort_by_key(|e| e.created_at);
        Ok(endpoints)
    }

    async fn endpoint(
        &self,
        company_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<Option<WebhookEndpoint>, WebhookError> {
        Ok(self
            .lock()
            .endpoints
            .get(&endpoint_id)
            .filter(|e| e.company_id == company_id)
            .cloned())
    }

    async fn create_endpoint(
        &self,
        endpoint: WebhookEndpoint,
        audit: AuditEntry,
    ) -> Result<WebhookEndpoint, WebhookError> {
        let mut state = self.lock();
        state.endpoints.insert(endpoint.id, endpoint.clone());
        state.append_audit(audit);
        Ok(endpoint)
    }

    async fn update_endpoint(
        &self,
        endpoint: WebhookEndpoint,
        audit: AuditEntry,
    ) -> Result<WebhookEndpoint, WebhookError> {
        let mut state = self.lock();
        let stored = state
            .endpoints
            .get_mut(&endpoint.id)
            .filter(|e| e.company_id == endpoint.company_id)
            .ok_or(WebhookError::EndpointNotFound(endpoint.id))?;
        stored.url = endpoint.url;
        stored.events = endpoint.events;
        stored.is_active = endpoint.is_active;
        stored.failure_count = endpoint.failure_count;
        stored.updated_at = endpoint.updated_at;
        let updated = stored.clone();
        state.append_audit(audit);
        Ok(updated)
    }

    async fn record_event(&self, event: &DomainEvent) -> Result<(), WebhookError> {
        self.lock().record_event(event.clone());
        Ok(())
    }

    async fn pending_events(
        &self,
        before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DomainEvent>, WebhookError> {
        let state = self.lock();
        let mut pending: Vec<DomainEvent> = state
            .outbox
            .iter()
            .filter(|row| !row.fanned_out && row.event.occurred_at < before)
            .map(|row| row.event.clone())
            .collect();
        pending.sort_by_key(|e| e.occurred_at);
        pending.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(pending)
    }

    async fn fan_out(
        &self,
        event: &DomainEvent,
        deliveries: Vec<WebhookDelivery>,
    ) -> Result<bool, WebhookError> {
        let mut state = self.lock();
        match state.outbox.iter().position(|row| row.event.id == event.id) {
            Some(i) if state.outbox[i].fanned_out => return Ok(false),
            Some(i) => state.outbox[i].fanned_out = true,
            None => state.outbox.push(OutboxRow {
                event: event.clone(),
                fanned_out: true,
            }),
        }
        state
            .deliveries
            .extend(deliveries.into_iter().map(|delivery| QueuedDelivery {
                delivery,
                claim: None,
            }));
        Ok(true)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: u32,
    ) -> Result<Vec<ClaimedDelivery>, WebhookError> {
        let mut state = self.lock();
        let State {
            deliveries,
            endpoints,
            ..
        } = &mut *state;

        let mut due: Vec<usize> = deliveries
            .iter()
            .enumerate()
            .filter(|(_, q)| {
                matches!(
                    q.delivery.status,
                    DeliveryStatus::Pending | DeliveryStatus::Failed
                ) && q.delivery.next_attempt_at.is_some_and(|at| at <= now)
                    && q.claim.as_ref().is_none_or(|c| c.until <= now)
            })
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| {
            let d = &deliveries[i].delivery;
            (d.next_attempt_at, d.created_at)
        });

        let mut claimed = Vec::new();
        for i in due {
            if claimed.len() >= usize::try_from(limit).unwrap_or(usize::MAX) {
                break;
            }
            let queued = &mut deliveries[i];
            let Some(endpoint) = endpoints.get(&queued.delivery.endpoint_id) else {
                continue;
            };
            let token = Uuid::new_v4();
            queued.claim = Some(Claim {
                token,
                until: now + lease,
            });
            claimed.push(ClaimedDelivery {
                delivery: queued.delivery.clone(),
                endpoint: endpoint.clone(),
                claim_token: token,
            });
        }
        Ok(claimed)
    }

    async fn record_attempt(&self, record: AttemptRecord) -> Result<bool, WebhookError> {
        let mut state = self.lock();
        let State {
            deliveries,
            endpoints,
            ..
        } = &mut *state;

        let Some(queued) = deliveries.iter_mut().find(|q| {
            q.delivery.id == record.delivery.id
                && q.claim.as_ref().is_some_and(|c| c.token == record.claim_token)
        }) else {
            return Ok(false);
        };

        if let Some(succeeded) = record.endpoint_success {
            if let Some(endpoint) = endpoints.get_mut(&queued.delivery.endpoint_id) {
                let health = EndpointService::after_attempt(
                    EndpointHealth {
                        failure_count: endpoint.failure_count,
                        is_active: endpoint.is_active,
                    },
                    succeeded,
                    record.disable_after,
                );
                endpoint.failure_count = health.failure_count;
                endpoint.is_active = health.is_active;
                endpoint.last_attempt_at = Some(record.delivery.updated_at);
            }
        }
        queued.delivery = record.delivery;
        queued.claim = None;
        Ok(true)
    }

    async fn deliveries(
        &self,
        company_id: Uuid,
        endpoint_id: Uuid,
        page_request: PageRequest,
    ) -> Result<Vec<WebhookDelivery>, WebhookError> {
        let state = self.lock();
        let mut found: Vec<WebhookDelivery> = state
            .deliveries
            .iter()
            .map(|q| &q.delivery)
            .filter(|d| d.company_id == company_id && d.endpoint_id == endpoint_id)
            .cloned()
            .collect();
        found.reverse();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(found.into_iter(), page_request))
    }
}

#[async_trait]
impl ClosingStore for MemoryStore {
    async fn find(&self, key: ClosingKey) -> Result<Option<DailyClosing>, ClosingError> {
        Ok(self.lock().closings.get(&key).cloned())
    }

    async fn previous(&self, key: ClosingKey) -> Result<Option<DailyClosing>, ClosingError> {
        Ok(self
            .lock()
            .closings
            .values()
            .filter(|c| {
                c.company_id == key.company_id
                    && c.branch_id == key.branch_id
                    && c.provider == key.provider
                    && c.date < key.date
            })
            .max_by_key(|c| c.date)
            .cloned())
    }

    async fn movements(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
        provider: Provider,
        from: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<BalanceMovement>, ClosingError> {
        Ok(self
            .lock()
            .movements
            .iter()
            .filter(|m| {
                m.company_id == company_id
                    && m.branch_id == branch_id
                    && m.provider == provider
                    && from.is_none_or(|from| m.created_at >= from)
                    && m.created_at < until
            })
            .cloned()
            .collect())
    }

    async fn live_position(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
        provider: Provider,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<LivePosition>, ClosingError> {
        let state = self.lock();
        let Some(account) = state.balances.get(&(company_id, branch_id, provider)) else {
            return Ok(None);
        };
        let moved_since = state
            .movements
            .iter()
            .filter(|m| {
                m.company_id == company_id
                    && m.branch_id == branch_id
                    && m.provider == provider
                    && m.created_at >= cutoff
            })
            .map(|m| m.delta)
            .sum();
        Ok(Some(LivePosition {
            balance: account.balance,
            moved_since,
        }))
    }

    async fn save(
        &self,
        closing: DailyClosing,
        audit: AuditEntry,
        replace: bool,
    ) -> Result<DailyClosing, ClosingError> {
        let mut state = self.lock();
        let key = ClosingKey {
            company_id: closing.company_id,
            branch_id: closing.branch_id,
            provider: closing.provider,
            date: closing.date,
        };
        if !replace && state.closings.contains_key(&key) {
            return Err(ClosingError::AlreadyClosed(closing.date));
        }
        state.closings.insert(key, closing.clone());
        state.append_audit(audit);
        Ok(closing)
    }

    async fn list(
        &self,
        company_id: Uuid,
        date: Option<NaiveDate>,
        page_request: PageRequest,
    ) -> Result<Vec<DailyClosing>, ClosingError> {
        let mut found: Vec<DailyClosing> = self
            .lock()
            .closings
            .values()
            .filter(|c| c.company_id == company_id && date.is_none_or(|d| c.date == d))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then(a.branch_id.cmp(&b.branch_id))
                .then(a.provider.cmp(&b.provider))
        });
        Ok(page(found.into_iter(), page_request))
    }
}

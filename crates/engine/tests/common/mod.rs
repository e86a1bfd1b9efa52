//! Shared fixtures for engine integration tests.
//!
//! Everything runs against `MemoryStore`; the bus carries a recording sink so
//! tests can assert on what was published after `settle`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use merchant_core::audit::{AuditAction, AuditLog, AuditQuery};
use merchant_core::events::{DomainEvent, EventType};
use merchant_core::ledger::{Channel, Direction, LedgerStore, NewTransaction, Provider};
use merchant_core::tenant::{Branch, Company, CompanySettings, Membership, Role, TenantContext};
use merchant_engine::{EventBus, EventSink, LedgerEngine, MemoryStore, NewBalance, SinkError};
use merchant_shared::PageRequest;
use merchant_shared::config::BusConfig;

/// Captures every event it is handed.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn types_for(&self, entity_id: Uuid) -> Vec<EventType> {
        self.events()
            .into_iter()
            .filter(|e| e.entity_id == entity_id)
            .map(|e| e.event_type)
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, event: &DomainEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// One company with a branch, a member per role, and two opened accounts:
/// Ecobank (bank) at 10 000 and MTN (mobile money) at 2 000.
pub struct Tenant {
    pub company: Company,
    pub branch: Branch,
    pub teller: TenantContext,
    pub manager: TenantContext,
    pub admin: TenantContext,
    pub memberships: Vec<Membership>,
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<EventBus>,
    pub ledger: Arc<LedgerEngine>,
    pub recorder: Arc<RecordingSink>,
    pub tenant: Tenant,
}

pub fn bus_config() -> BusConfig {
    BusConfig {
        sink_retry_attempts: 3,
        sink_retry_base_ms: 1,
    }
}

pub async fn harness() -> Harness {
    harness_with(CompanySettings::default()).await
}

pub async fn harness_with(settings: CompanySettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(EventBus::new(bus_config()));
    let recorder = Arc::new(RecordingSink::default());
    bus.register(recorder.clone());
    let ledger = Arc::new(LedgerEngine::new(store.clone(), bus.clone()));
    let tenant = tenant(&store, &ledger, settings).await;
    Harness {
        store,
        bus,
        ledger,
        recorder,
        tenant,
    }
}

/// Adds a second company to an existing store.
pub async fn tenant(
    store: &MemoryStore,
    ledger: &LedgerEngine,
    settings: CompanySettings,
) -> Tenant {
    let company = Company {
        id: Uuid::new_v4(),
        name: format!("Agent {}", Uuid::new_v4()),
        is_active: true,
        settings,
        created_at: Utc::now(),
    };
    store.add_company(company.clone());
    let branch = Branch {
        id: Uuid::new_v4(),
        company_id: company.id,
        name: "Makola".to_string(),
    };
    store.add_branch(branch.clone());

    let memberships: Vec<Membership> = [Role::Teller, Role::Manager, Role::Admin]
        .into_iter()
        .map(|role| Membership {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            company_id: company.id,
            role,
            branch_id: Some(branch.id),
            is_active: true,
            company_active: true,
        })
        .collect();
    for membership in &memberships {
        store.add_membership(membership.clone());
    }

    let tenant = Tenant {
        teller: TenantContext::from_membership(&memberships[0]),
        manager: TenantContext::from_membership(&memberships[1]),
        admin: TenantContext::from_membership(&memberships[2]),
        company,
        branch,
        memberships,
    };
    for (provider, starting_balance) in [(Provider::Ecobank, dec!(10000)), (Provider::Mtn, dec!(2000))] {
        ledger
            .open_balance(
                &tenant.admin,
                NewBalance {
                    branch_id: tenant.branch.id,
                    provider,
                    starting_balance,
                },
            )
            .await
            .expect("open balance");
    }
    tenant
}

impl Harness {
    /// Wait until every sink drained; the bus accepts nothing afterwards.
    pub async fn settle(&self) {
        self.bus.shutdown().await;
    }

    pub async fn balance(&self, provider: Provider) -> Decimal {
        self.store
            .balance(self.tenant.company.id, self.tenant.branch.id, provider)
            .await
            .unwrap()
            .expect("account opened")
            .balance
    }

    pub async fn audit_actions(&self, entity_id: Uuid) -> Vec<AuditAction> {
        audit_actions(&self.store, self.tenant.company.id, entity_id).await
    }
}

pub async fn audit_actions(store: &MemoryStore, company_id: Uuid, entity_id: Uuid) -> Vec<AuditAction> {
    let mut entries = store
        .entries(
            company_id,
            AuditQuery {
                entity_id: Some(entity_id),
                page: PageRequest::new(200, 0),
            },
        )
        .await
        .unwrap();
    entries.sort_by_key(|e| e.sequence);
    entries.into_iter().map(|e| e.action).collect()
}

pub fn bank(tenant: &Tenant, direction: Direction, amount: Decimal) -> NewTransaction {
    NewTransaction {
        branch_id: tenant.branch.id,
        channel: Channel::Bank,
        direction,
        provider: Provider::Ecobank,
        amount,
        customer_ref: Some("CUST-001".to_string()),
        description: None,
    }
}

pub fn momo(tenant: &Tenant, direction: Direction, amount: Decimal) -> NewTransaction {
    NewTransaction {
        branch_id: tenant.branch.id,
        channel: Channel::MobileMoney,
        direction,
        provider: Provider::Mtn,
        amount,
        customer_ref: None,
        description: None,
    }
}

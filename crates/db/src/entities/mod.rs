//! `SeaORM` entity definitions.

pub mod prelude;

pub mod audit_entries;
pub mod balance_movements;
pub mod branches;
pub mod companies;
pub mod daily_closings;
pub mod event_outbox;
pub mod memberships;
pub mod provider_balances;
pub mod reversals;
pub mod sea_orm_active_enums;
pub mod transactions;
pub mod webhook_deliveries;
pub mod webhook_endpoints;

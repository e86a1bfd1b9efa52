//! Entity re-exports.

pub use super::audit_entries::Entity as AuditEntries;
pub use super::balance_movements::Entity as BalanceMovements;
pub use super::branches::Entity as Branches;
pub use super::companies::Entity as Companies;
pub use super::daily_closings::Entity as DailyClosings;
pub use super::event_outbox::Entity as EventOutbox;
pub use super::memberships::Entity as Memberships;
pub use super::provider_balances::Entity as ProviderBalances;
pub use super::reversals::Entity as Reversals;
pub use super::transactions::Entity as Transactions;
pub use super::webhook_deliveries::Entity as WebhookDeliveries;
pub use super::webhook_endpoints::Entity as WebhookEndpoints;

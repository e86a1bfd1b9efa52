//! Repository implementations of the core storage ports.
//!
//! Every call opens its own RLS-scoped database transaction; see
//! [`crate::rls`].

pub mod audit;
pub mod closing;
pub mod ledger;
pub mod tenant;
pub mod webhook;

pub use audit::AuditRepository;
pub use closing::ClosingRepository;
pub use ledger::LedgerRepository;
pub use tenant::TenantRepository;
pub use webhook::WebhookRepository;

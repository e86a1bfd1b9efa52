//! Transaction lifecycle ledger.
//!
//! This module owns the transaction state machine and the provider balances
//! that completed transactions move.
//!
//! # Modules
//!
//! - `types` - Transactions, statuses, providers, balances, movements
//! - `service` - Transition rules and creation policy
//! - `error` - Ledger failures
//! - `store` - Atomic storage port

pub mod error;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod service_props;

pub use error::LedgerError;
pub use service::{Completion, LedgerService};
pub use store::{BalanceMutation, CommitReceipt, LedgerStore, TransitionUnit};
pub use types::{
    BalanceMovement, Channel, Direction, MovementKind, NewTransaction, Provider, ProviderBalance,
    ReversalRecord, Transaction, TransactionFilter, TransactionStatus,
};

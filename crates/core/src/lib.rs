//! Core business logic for MerchantPlus.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! Domain types, transition rules, and the storage ports the outer crates
//! implement all live here.
//!
//! # Modules
//!
//! - `tenant` - Tenant resolution and roles
//! - `ledger` - Transaction lifecycle state machine and provider balances
//! - `audit` - Append-only audit entries
//! - `events` - Domain events and their payload
//! - `webhook` - Endpoint registry, delivery state machine, signing, backoff
//! - `closing` - Daily closing arithmetic

pub mod audit;
pub mod closing;
pub mod events;
pub mod ledger;
pub mod tenant;
pub mod webhook;

//! Domain events announced after commit.
//!
//! # Modules
//!
//! - `types` - Event types and the outbound payload

pub mod types;

pub use types::{DomainEvent, EventType, dashboard_topic};

//! Append-only audit trail.
//!
//! # Modules
//!
//! - `types` - Entries, actions, entity kinds
//! - `recorder` - Entry construction with before/after snapshots
//! - `error` - Snapshot and storage failures
//! - `store` - Read-only log port

pub mod error;
pub mod recorder;
pub mod store;
pub mod types;

pub use error::AuditError;
pub use recorder::AuditRecorder;
pub use store::AuditLog;
pub use types::{AuditAction, AuditEntry, AuditQuery, EntityType};

//! End-of-day reconciliation per balance account.
//!
//! # Modules
//!
//! - `types` - Closing rows and keys
//! - `service` - Windows, sums, and discrepancy
//! - `error` - Closing failures
//! - `store` - Storage port

pub mod error;
pub mod service;
pub mod store;
pub mod types;

pub use error::ClosingError;
pub use service::ClosingService;
pub use store::ClosingStore;
pub use types::{ClosingKey, DailyClosing, LivePosition};

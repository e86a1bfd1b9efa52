//! Tenant scoping and authorization.
//!
//! # Modules
//!
//! - `role` - Ordered membership roles
//! - `context` - Companies, memberships, and the resolved `TenantContext`
//! - `resolver` - Selector/membership resolution rules
//! - `error` - Resolution failures
//! - `store` - Membership directory port

pub mod context;
pub mod error;
pub mod resolver;
pub mod role;
pub mod store;

#[cfg(test)]
mod resolver_props;

pub use context::{Actor, Branch, Company, CompanySettings, Membership, TenantContext};
pub use error::TenantError;
pub use resolver::TenantResolver;
pub use role::Role;
pub use store::TenantDirectory;

//! Request middleware.
//!
//! # Modules
//!
//! - `auth` - Bearer token validation
//! - `tenant` - Tenant resolution from the `X-Company-Id` selector

pub mod auth;
pub mod tenant;

pub use auth::{AuthUser, auth_middleware};
pub use tenant::{COMPANY_HEADER, Tenant, tenant_middleware};

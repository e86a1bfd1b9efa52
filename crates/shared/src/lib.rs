//! Shared types, errors, and configuration for MerchantPlus.
//!
//! This crate provides the pieces every other crate leans on:
//! - Application-wide error type
//! - Layered configuration loading
//! - Caller identity (JWT access tokens)
//! - Pagination for list endpoints

pub mod auth;
pub mod config;
pub mod error;
pub mod jwt;
pub mod types;

pub use auth::Claims;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use jwt::{JwtConfig, JwtError, JwtService};
pub use types::PageRequest;

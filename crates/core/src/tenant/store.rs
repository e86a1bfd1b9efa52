//! Membership directory port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::tenant::context::{Company, Membership};
use crate::tenant::error::TenantError;

/// Read access to who belongs where.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// All memberships of a user across every company, with company status.
    async fn memberships_for_user(&self, user_id: Uuid) -> Result<Vec<Membership>, TenantError>;

    /// Active companies, for background passes that walk every tenant.
    async fn active_companies(&self) -> Result<Vec<Company>, TenantError>;
}

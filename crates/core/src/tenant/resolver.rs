//! Resolution of the acting tenant for a request.

use uuid::Uuid;

use crate::tenant::context::{Membership, TenantContext};
use crate::tenant::error::TenantError;

/// Stateless resolver turning a caller's memberships into a `TenantContext`.
pub struct TenantResolver;

impl TenantResolver {
    /// Resolve the acting tenant.
    ///
    /// # Arguments
    /// * `user_id` - The authenticated caller
    /// * `selector` - Explicit company selector, if the request carried one
    /// * `memberships` - Every membership the directory holds for the caller
    ///
    /// # Returns
    /// * `Ok(TenantContext)` for the single usable membership in scope
    /// * `Err(TenantError::Unauthorized)` if the selected company has no usable membership
    /// * `Err(TenantError::AmbiguousTenant)` if no selector and several usable memberships
    /// * `Err(TenantError::NoTenant)` if no selector and no usable membership
    pub fn resolve(
        user_id: Uuid,
        selector: Option<Uuid>,
        memberships: &[Membership],
    ) -> Result<TenantContext, TenantError> {
        let mut usable = memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.is_usable());

        match selector {
            Some(company_id) => usable
                .find(|m| m.company_id == company_id)
                .map(TenantContext::from_membership)
                .ok_or(TenantError::Unauthorized(company_id)),
            None => {
                let candidates: Vec<&Membership> = usable.collect();
                match candidates.as_slice() {
                    [] => Err(TenantError::NoTenant),
                    [only] => Ok(TenantContext::from_membership(only)),
                    many => Err(TenantError::AmbiguousTenant(many.len())),
                }
            }
        }
    }
}

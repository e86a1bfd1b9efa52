//! Tenant resolution over the membership directory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use merchant_core::tenant::{
    Company, Membership, TenantContext, TenantDirectory, TenantError, TenantResolver,
};
use moka::future::Cache;
use tracing::debug;
use uuid::Uuid;

const MEMBERSHIP_CACHE_CAPACITY: u64 = 10_000;

/// TTL cache of a user's memberships in front of another directory.
///
/// A zero TTL disables caching. Company listings always go to the inner
/// directory.
pub struct CachedTenantDirectory {
    inner: Arc<dyn TenantDirectory>,
    cache: Option<Cache<Uuid, Arc<Vec<Membership>>>>,
}

impl CachedTenantDirectory {
    /// Wraps a directory with a membership cache of the given TTL.
    #[must_use]
    pub fn new(inner: Arc<dyn TenantDirectory>, ttl: Duration) -> Self {
        let cache = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(MEMBERSHIP_CACHE_CAPACITY)
                .time_to_live(ttl)
                .build()
        });
        Self { inner, cache }
    }

    /// Drop the cached memberships of one user.
    pub async fn invalidate(&self, user_id: Uuid) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&user_id).await;
        }
    }
}

#[async_trait]
impl TenantDirectory for CachedTenantDirectory {
    async fn memberships_for_user(&self, user_id: Uuid) -> Result<Vec<Membership>, TenantError> {
        let Some(cache) = &self.cache else {
            return self.inner.memberships_for_user(user_id).await;
        };
        let memberships = cache
            .try_get_with(user_id, async {
                debug!(user_id = %user_id, "Membership cache miss");
                self.inner.memberships_for_user(user_id).await.map(Arc::new)
            })
            .await
            .map_err(|e| TenantError::Storage(e.to_string()))?;
        Ok(memberships.as_ref().clone())
    }

    async fn active_companies(&self) -> Result<Vec<Company>, TenantError> {
        self.inner.active_companies().await
    }
}

/// Turns an authenticated user and an optional company selector into the
/// request's `TenantContext`.
#[derive(Clone)]
pub struct TenantContextResolver {
    directory: Arc<dyn TenantDirectory>,
}

impl TenantContextResolver {
    /// Creates a resolver over a directory.
    #[must_use]
    pub const fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve the acting tenant.
    ///
    /// # Errors
    /// * `Unauthorized` if the selected company has no usable membership
    /// * `AmbiguousTenant` / `NoTenant` without a selector
    pub async fn resolve(
        &self,
        user_id: Uuid,
        selector: Option<Uuid>,
    ) -> Result<TenantContext, TenantError> {
        let memberships = self.directory.memberships_for_user(user_id).await?;
        TenantResolver::resolve(user_id, selector, &memberships)
    }
}

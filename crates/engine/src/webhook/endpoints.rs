//! Tenant-facing endpoint management.

use std::sync::Arc;

use chrono::Utc;
use merchant_core::audit::{AuditAction, AuditRecorder, EntityType};
use merchant_core::tenant::{Role, TenantContext};
use merchant_core::webhook::{
    EndpointService, EndpointUpdate, NewEndpoint, WebhookDelivery, WebhookEndpoint,
    WebhookError, WebhookStore,
};
use merchant_shared::PageRequest;
use tracing::info;
use uuid::Uuid;

/// Admin operations on a company's webhook endpoints.
#[derive(Clone)]
pub struct WebhookEndpoints {
    store: Arc<dyn WebhookStore>,
}

impl WebhookEndpoints {
    /// Creates the service.
    #[must_use]
    pub const fn new(store: Arc<dyn WebhookStore>) -> Self {
        Self { store }
    }

    /// Register an endpoint. The returned value is the only one that carries
    /// the generated secret to the caller.
    pub async fn create(
        &self,
        ctx: &TenantContext,
        input: NewEndpoint,
    ) -> Result<WebhookEndpoint, WebhookError> {
        require_admin(ctx)?;
        let now = Utc::now();
        let endpoint = EndpointService::create(ctx.company_id(), input, now)?;
        let audit = AuditRecorder::record(
            ctx.company_id(),
            ctx.actor(),
            AuditAction::CreateWebhook,
            (EntityType::WebhookEndpoint, endpoint.id),
            None,
            Some(&endpoint),
            now,
        )?;

        let created = self.store.create_endpoint(endpoint, audit).await?;
        info!(company_id = %created.company_id, endpoint_id = %created.id, "Webhook endpoint created");
        Ok(created)
    }

    /// Endpoints of the caller's company.
    pub async fn list(&self, ctx: &TenantContext) -> Result<Vec<WebhookEndpoint>, WebhookError> {
        require_admin(ctx)?;
        self.store.endpoints(ctx.company_id()).await
    }

    /// Change URL, subscriptions, or activation.
    pub async fn update(
        &self,
        ctx: &TenantContext,
        endpoint_id: Uuid,
        update: EndpointUpdate,
    ) -> Result<WebhookEndpoint, WebhookError> {
        require_admin(ctx)?;
        let current = self.find(ctx, endpoint_id).await?;
        let now = Utc::now();
        let next = EndpointService::apply_update(&current, update, now)?;
        let audit = AuditRecorder::record(
            ctx.company_id(),
            ctx.actor(),
            AuditAction::UpdateWebhook,
            (EntityType::WebhookEndpoint, endpoint_id),
            Some(&current),
            Some(&next),
            now,
        )?;

        let updated = self.store.update_endpoint(next, audit).await?;
        info!(
            company_id = %updated.company_id,
            endpoint_id = %updated.id,
            is_active = updated.is_active,
            "Webhook endpoint updated"
        );
        Ok(updated)
    }

    /// Deliveries of one endpoint, newest first.
    pub async fn deliveries(
        &self,
        ctx: &TenantContext,
        endpoint_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<WebhookDelivery>, WebhookError> {
        require_admin(ctx)?;
        self.find(ctx, endpoint_id).await?;
        self.store
            .deliveries(ctx.company_id(), endpoint_id, page)
            .await
    }

    async fn find(
        &self,
        ctx: &TenantContext,
        endpoint_id: Uuid,
    ) -> Result<WebhookEndpoint, WebhookError> {
        self.store
            .endpoint(ctx.company_id(), endpoint_id)
            .await?
            .ok_or(WebhookError::EndpointNotFound(endpoint_id))
    }
}

fn require_admin(ctx: &TenantContext) -> Result<(), WebhookError> {
    if ctx.role().at_least(Role::Admin) {
        Ok(())
    } else {
        Err(WebhookError::InsufficientRole {
            role: ctx.role(),
            required: Role::Admin,
        })
    }
}

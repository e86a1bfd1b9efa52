//! Audit log read port.
//!
//! Appends happen only inside the storage units of the other ports; this
//! trait exposes reads and nothing else.

use async_trait::async_trait;
use uuid::Uuid;

use crate::audit::error::AuditError;
use crate::audit::types::{AuditEntry, AuditQuery};

/// Read access to a company's audit trail.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Entries of one company in append order.
    async fn entries(
        &self,
        company_id: Uuid,
        query: AuditQuery,
    ) -> Result<Vec<AuditEntry>, AuditError>;
}

//! Construction of audit entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::audit::error::AuditError;
use crate::audit::types::{AuditAction, AuditEntry, EntityType};
use crate::tenant::Actor;

/// Stateless builder of audit entries.
///
/// The recorder only snapshots; the entry is appended by the same storage
/// unit that writes the business change, so a failed append fails the change.
pub struct AuditRecorder;

impl AuditRecorder {
    /// Build an entry for an action on one entity.
    ///
    /// # Errors
    /// * `AuditError::Snapshot` if either snapshot cannot be serialized
    pub fn record<T: Serialize>(
        company_id: Uuid,
        actor: Actor,
        action: AuditAction,
        entity: (EntityType, Uuid),
        before: Option<&T>,
        after: Option<&T>,
        at: DateTime<Utc>,
    ) -> Result<AuditEntry, AuditError> {
        let (entity_type, entity_id) = entity;
        Ok(AuditEntry {
            id: Uuid::new_v4(),
            company_id,
            sequence: 0,
            actor,
            entity_type,
            entity_id,
            action,
            before: before.map(serde_json::to_value).transpose()?,
            after: after.map(serde_json::to_value).transpose()?,
            created_at: at,
        })
    }
}

//! Audit log storage.
//!
//! Entries are appended only from inside the other repositories' units of
//! work; the table trigger rejects every UPDATE and DELETE.

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use uuid::Uuid;

use merchant_core::audit::{AuditEntry, AuditError, AuditLog, AuditQuery};

use crate::convert;
use crate::entities::audit_entries;
use crate::rls::RlsConnection;

/// Appends an entry inside an open unit of work.
pub(crate) async fn append<C: ConnectionTrait>(conn: &C, entry: &AuditEntry) -> Result<(), DbErr> {
    audit_entries::Entity::insert(convert::audit_entry_active(entry))
        .exec(conn)
        .await?;
    Ok(())
}

/// Read access to the audit trail.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    db: DatabaseConnection,
}

impl AuditRepository {
    /// Creates a new audit repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditLog for AuditRepository {
    async fn entries(
        &self,
        company_id: Uuid,
        query: AuditQuery,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let rls = RlsConnection::new(&self.db, company_id)
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        let mut select = audit_entries::Entity::find()
            .filter(audit_entries::Column::CompanyId.eq(company_id));
        if let Some(entity_id) = query.entity_id {
            select = select.filter(audit_entries::Column::EntityId.eq(entity_id));
        }

        let rows = select
            .order_by_asc(audit_entries::Column::Sequence)
            .offset(query.page.offset())
            .limit(query.page.limit())
            .all(rls.transaction())
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        rls.commit()
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        rows.into_iter()
            .map(|model| {
                let id = model.id;
                convert::audit_entry(model)
                    .ok_or_else(|| AuditError::Storage(format!("Unreadable audit entry {id}")))
            })
            .collect()
    }
}

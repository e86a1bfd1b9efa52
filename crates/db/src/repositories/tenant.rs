//! Tenant directory and provisioning.

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use merchant_core::tenant::{Branch, Company, Membership, TenantDirectory, TenantError};

use crate::convert;
use crate::entities::{branches, companies, memberships};
use crate::rls::RlsConnection;

/// Membership lookups and tenant provisioning.
///
/// Lookups span every company, so they run in the system scope.
#[derive(Debug, Clone)]
pub struct TenantRepository {
    db: DatabaseConnection,
}

impl TenantRepository {
    /// Creates a new tenant repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts a company.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be encoded or the insert fails.
    pub async fn create_company(&self, company: &Company) -> Result<(), DbErr> {
        let active =
            convert::company_active(company).map_err(|e| DbErr::Custom(e.to_string()))?;
        let rls = RlsConnection::new(&self.db, company.id).await?;
        active.insert(rls.transaction()).await?;
        rls.commit().await
    }

    /// Inserts a branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_branch(&self, branch: &Branch) -> Result<(), DbErr> {
        let rls = RlsConnection::new(&self.db, branch.company_id).await?;
        branches::ActiveModel {
            id: Set(branch.id),
            company_id: Set(branch.company_id),
            name: Set(branch.name.clone()),
            created_at: Set(chrono::Utc::now().into()),
        }
        .insert(rls.transaction())
        .await?;
        rls.commit().await
    }

    /// Inserts a membership.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_membership(&self, membership: &Membership) -> Result<(), DbErr> {
        let rls = RlsConnection::new(&self.db, membership.company_id).await?;
        memberships::ActiveModel {
            id: Set(membership.id),
            user_id: Set(membership.user_id),
            company_id: Set(membership.company_id),
            role: Set(membership.role.into()),
            branch_id: Set(membership.branch_id),
            is_active: Set(membership.is_active),
            created_at: Set(chrono::Utc::now().into()),
        }
        .insert(rls.transaction())
        .await?;
        rls.commit().await
    }

    /// Suspends or reactivates a company.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_company_active(&self, company_id: Uuid, is_active: bool) -> Result<u64, DbErr> {
        let rls = RlsConnection::new(&self.db, company_id).await?;
        let result = companies::Entity::update_many()
            .col_expr(companies::Column::IsActive, Expr::value(is_active))
            .col_expr(
                companies::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().fixed_offset()),
            )
            .filter(companies::Column::Id.eq(company_id))
            .exec(rls.transaction())
            .await?;
        rls.commit().await?;
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl TenantDirectory for TenantRepository {
    async fn memberships_for_user(&self, user_id: Uuid) -> Result<Vec<Membership>, TenantError> {
        let rls = RlsConnection::system(&self.db)
            .await
            .map_err(|e| TenantError::Storage(e.to_string()))?;

        let rows = memberships::Entity::find()
            .filter(memberships::Column::UserId.eq(user_id))
            .find_also_related(companies::Entity)
            .all(rls.transaction())
            .await
            .map_err(|e| TenantError::Storage(e.to_string()))?;

        rls.commit()
            .await
            .map_err(|e| TenantError::Storage(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(membership, company)| {
                let company_active = company.is_some_and(|c| c.is_active);
                convert::membership(membership, company_active)
            })
            .collect())
    }

    async fn active_companies(&self) -> Result<Vec<Company>, TenantError> {
        let rls = RlsConnection::system(&self.db)
            .await
            .map_err(|e| TenantError::Storage(e.to_string()))?;

        let rows = companies::Entity::find()
            .filter(companies::Column::IsActive.eq(true))
            .all(rls.transaction())
            .await
            .map_err(|e| TenantError::Storage(e.to_string()))?;

        rls.commit()
            .await
            .map_err(|e| TenantError::Storage(e.to_string()))?;

        rows.into_iter()
            .map(|model| convert::company(model).map_err(|e| TenantError::Storage(e.to_string())))
            .collect()
    }
}

//! `SeaORM` Entity for balance_movements table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{MovementKind, ProviderCode};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "balance_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Commit order, assigned by the database.
    pub seq: i64,
    pub company_id: Uuid,
    pub branch_id: Uuid,
    pub provider: ProviderCode,
    pub transaction_id: Option<Uuid>,
    pub kind: MovementKind,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub delta: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub balance_after: Decimal,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

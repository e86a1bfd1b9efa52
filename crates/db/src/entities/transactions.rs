//! `SeaORM` Entity for transactions table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{
    ProviderCode, TransactionChannel, TransactionDirection, TransactionStatus,
};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub branch_id: Uuid,
    #[sea_orm(unique)]
    pub reference: String,
    pub channel: TransactionChannel,
    pub direction: TransactionDirection,
    pub provider: ProviderCode,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub fee: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub net_amount: Decimal,
    pub currency: String,
    pub customer_ref: Option<String>,
    pub description: Option<String>,
    pub initiated_by: Uuid,
    pub status: TransactionStatus,
    pub requires_approval: bool,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTimeWithTimeZone>,
    pub rejection_reason: Option<String>,
    pub failure_reason: Option<String>,
    pub completed_at: Option<DateTimeWithTimeZone>,
    pub reversed_by: Option<Uuid>,
    pub reversed_at: Option<DateTimeWithTimeZone>,
    pub reversal_reason: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::reversals::Entity")]
    Reversals,
}

impl Related<super::reversals::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reversals.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

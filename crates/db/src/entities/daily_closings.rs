//! `SeaORM` Entity for daily_closings table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::ProviderCode;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "daily_closings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub branch_id: Uuid,
    pub provider: ProviderCode,
    pub date: Date,
    pub window_start: DateTimeWithTimeZone,
    pub window_end: DateTimeWithTimeZone,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub opening_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub closing_balance: Decimal,
    pub transaction_count: i32,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub live_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub discrepancy: Decimal,
    pub created_at: DateTimeWithTimeZone,
    pub recomputed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

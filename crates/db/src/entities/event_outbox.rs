//! `SeaORM` Entity for event_outbox table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "event_outbox")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub event_type: String,
    pub entity_id: Uuid,
    /// Serialized event body, signed and sent as is.
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    pub occurred_at: DateTimeWithTimeZone,
    /// Set once deliveries for the event were queued.
    pub fanned_out_at: Option<DateTimeWithTimeZone>,
    pub last_error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Deduplication and audit ledger for webhook deliveries. Exactly one row per
/// (provider, event_id); the unique index on that pair is the dedup boundary
/// for concurrent redeliveries.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    #[sea_orm(column_type = "Json")]
    pub payload: Json,
    pub processing_status: String,
    pub order_id: Option<Uuid>,
    pub error: Option<String>,
    pub received_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

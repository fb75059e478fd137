use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One gateway payment intent for an order. `provider_order_id` is unique per
/// provider; at most one row per order ever reaches `captured`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub provider_order_id: String,
    pub provider_payment_id: Option<String>,
    pub provider_signature: Option<String>,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    /// Last-seen provider payload, kept verbatim for audit.
    #[sea_orm(column_type = "Json", nullable)]
    pub raw: Option<Json>,
    pub created_at: DateTimeUtc,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

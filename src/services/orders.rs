//! Order creation: converts a client-held cart into a durable order with
//! server-verified pricing, inside a single transaction.

use crate::{
    db::DbPool,
    entities::{order, order_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{OrderPaymentStatus, OrderStatus, PaymentMethod},
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // Permissive: digits plus common separators. Format enforcement belongs
    // to the carrier, not the checkout.
    Regex::new(r"^[0-9+\-()\s]+$").expect("phone pattern is valid")
});

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub qty: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInput {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(
        length(min = 8, max = 20, message = "Phone number must be 8-20 characters"),
        regex(path = "PHONE_PATTERN", message = "Phone number is invalid")
    )]
    pub phone: String,
    #[validate(length(min = 1, message = "Address line 1 is required"))]
    pub address_line1: String,
    pub address_line2: Option<String>,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 4, max = 10, message = "Postal code is required"))]
    pub pincode: String,
    #[serde(default = "default_country")]
    #[validate(length(min = 2, message = "Country is required"))]
    pub country: String,
}

fn default_country() -> String {
    "India".to_string()
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    /// Cart lines, deduplicated by the caller.
    #[validate(length(min = 1, message = "Cart is empty"))]
    #[validate]
    pub cart_items: Vec<CartItemInput>,
    #[validate]
    pub shipping: ShippingInput,
    pub payment_method: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderResponse {
    pub order_id: Uuid,
    /// Order total in integer minor currency units.
    pub total_amount: i64,
}

/// Service owning order creation and the conditional order-state transitions
/// used by payment reconciliation.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    default_currency: String,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, default_currency: String) -> Self {
        Self {
            db,
            event_sender,
            default_currency,
        }
    }

    /// Creates an order from a validated cart as one atomic unit: re-prices
    /// every line from the catalog, conditionally decrements stock, snapshots
    /// line items and persists the order. Any failure aborts the whole
    /// transaction with no observable writes.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<PlaceOrderResponse, ServiceError> {
        request.validate()?;

        let method = PaymentMethod::parse(&request.payment_method).ok_or_else(|| {
            ServiceError::ValidationError("Invalid payment method".to_string())
        })?;

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let mut total_amount: i64 = 0;
        let mut item_snapshots = Vec::with_capacity(request.cart_items.len());

        for line in &request.cart_items {
            let catalog_row = product::Entity::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;

            if !catalog_row.active {
                return Err(ServiceError::Conflict(format!(
                    "{} is no longer available",
                    catalog_row.title
                )));
            }

            // Stock check and decrement as one statement: the filter fails the
            // update when the remaining stock cannot cover this line, so two
            // racing checkouts can never both succeed on the last unit.
            let decremented = product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(line.qty),
                )
                .filter(product::Column::Id.eq(line.product_id))
                .filter(product::Column::Stock.gte(line.qty))
                .exec(&txn)
                .await?;
            if decremented.rows_affected == 0 {
                return Err(ServiceError::Conflict(format!(
                    "Insufficient stock for {}",
                    catalog_row.title
                )));
            }

            let line_total = catalog_row
                .price
                .checked_mul(i64::from(line.qty))
                .ok_or_else(|| {
                    ServiceError::ValidationError("Order total is too large".to_string())
                })?;
            total_amount = total_amount.checked_add(line_total).ok_or_else(|| {
                ServiceError::ValidationError("Order total is too large".to_string())
            })?;

            item_snapshots.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(catalog_row.id),
                title: Set(catalog_row.title),
                unit_price: Set(catalog_row.price),
                quantity: Set(line.qty),
                line_total: Set(line_total),
                created_at: Set(now),
            });
        }

        order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending.as_str().to_string()),
            payment_status: Set(OrderPaymentStatus::Unpaid.as_str().to_string()),
            payment_method: Set(method.as_str().to_string()),
            total_amount: Set(total_amount),
            currency: Set(self.default_currency.clone()),
            shipping_name: Set(request.shipping.name.clone()),
            shipping_phone: Set(request.shipping.phone.clone()),
            shipping_address_line1: Set(request.shipping.address_line1.clone()),
            shipping_address_line2: Set(request.shipping.address_line2.clone()),
            shipping_city: Set(request.shipping.city.clone()),
            shipping_state: Set(request.shipping.state.clone()),
            shipping_pincode: Set(request.shipping.pincode.clone()),
            shipping_country: Set(request.shipping.country.clone()),
            created_at: Set(now),
            paid_at: Set(None),
        }
        .insert(&txn)
        .await?;

        for item in item_snapshots {
            item.insert(&txn).await?;
        }

        txn.commit().await?;

        info!(order_id = %order_id, total_amount, "order created");
        self.event_sender.send(Event::OrderCreated(order_id)).await;

        Ok(PlaceOrderResponse {
            order_id,
            total_amount,
        })
    }

    /// Fetches an order, enforcing ownership.
    pub async fn get_owned_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found.".to_string()))?;
        if order.user_id != user_id {
            return Err(ServiceError::Forbidden("Forbidden.".to_string()));
        }
        Ok(order)
    }

    pub async fn get_order_items(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        self.get_owned_order(user_id, order_id).await?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(items)
    }

    pub async fn list_orders(&self, user_id: Uuid) -> Result<Vec<order::Model>, ServiceError> {
        let orders = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(orders)
    }

    /// Marks an order paid unless it already is; the guard and write are one
    /// statement, so a late failure notification can never race past it.
    pub async fn mark_paid_if_unpaid(&self, order_id: Uuid) -> Result<bool, ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(OrderPaymentStatus::Paid.as_str()),
            )
            .col_expr(order::Column::PaidAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.ne(OrderPaymentStatus::Paid.as_str()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Records a failed payment on the order; never regresses a paid order.
    pub async fn mark_payment_failed_unless_paid(
        &self,
        order_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(OrderPaymentStatus::Failed.as_str()),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.ne(OrderPaymentStatus::Paid.as_str()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Advances `pending -> confirmed`; a no-op for any later stage.
    pub async fn confirm_if_pending(&self, order_id: Uuid) -> Result<bool, ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(
                order::Column::Status,
                Expr::value(OrderStatus::Confirmed.as_str()),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending.as_str()))
            .exec(&*self.db)
            .await?;
        if result.rows_affected > 0 {
            self.event_sender.send(Event::OrderConfirmed(order_id)).await;
        }
        Ok(result.rows_affected > 0)
    }
}

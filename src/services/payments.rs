//! Payment intent management: creating gateway intents for payable orders and
//! verifying client-side payment confirmations.

use crate::{
    db::DbPool,
    entities::{order, payment},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{signature::verify_payment_signature, PaymentGateway, PROVIDER},
    models::{OrderPaymentStatus, OrderStatus, PaymentMethod, PaymentStatus},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub order_id: Uuid,
}

/// Everything the checkout UI needs to open the gateway widget.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentResponse {
    pub provider_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
    pub order_id: Uuid,
}

/// Client-side confirmation handed back by the gateway checkout widget.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "providerOrderId is required"))]
    pub provider_order_id: String,
    #[validate(length(min = 1, message = "providerPaymentId is required"))]
    pub provider_payment_id: String,
    #[validate(length(min = 1, message = "providerSignature is required"))]
    pub provider_signature: String,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
        }
    }

    async fn load_payable_order(
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
        if !OrderPaymentStatus::is_payable(&order.payment_status) {
            return Err(ServiceError::Conflict("Order is already paid.".to_string()));
        }
        if order.status == OrderStatus::Cancelled.as_str() {
            return Err(ServiceError::Conflict("Order is cancelled.".to_string()));
        }
        let method = PaymentMethod::parse(&order.payment_method);
        if !method.map(|m| m.is_online_gateway()).unwrap_or(false) {
            return Err(ServiceError::Conflict(
                "Selected payment method is not supported for online payment.".to_string(),
            ));
        }
        Ok(order)
    }

    /// Creates (or reuses) a gateway intent for an order's exact total.
    ///
    /// Re-invocations against an order with a live `created` or `authorized`
    /// intent return that intent instead of minting a new one, so retried
    /// checkouts do not accumulate gateway orders.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn create_intent(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<CreateIntentResponse, ServiceError> {
        let order = self.load_payable_order(user_id, order_id).await?;
        if order.total_amount <= 0 {
            return Err(ServiceError::ValidationError(
                "Order total is invalid.".to_string(),
            ));
        }

        let key_id = self.gateway.key_id()?;

        let existing = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order.id))
            .filter(payment::Column::Provider.eq(PROVIDER))
            .filter(payment::Column::Status.is_in([
                PaymentStatus::Created.as_str(),
                PaymentStatus::Authorized.as_str(),
            ]))
            .order_by_desc(payment::Column::CreatedAt)
            .one(&*self.db)
            .await?;
        if let Some(live) = existing {
            info!(payment_id = %live.id, "reusing live payment intent");
            return Ok(CreateIntentResponse {
                provider_order_id: live.provider_order_id,
                amount: live.amount,
                currency: live.currency,
                key_id,
                order_id: order.id,
            });
        }

        let intent = self
            .gateway
            .create_intent(order.total_amount, &order.currency, &order.id.to_string())
            .await?;
        if intent.amount != order.total_amount {
            warn!(
                intent_amount = intent.amount,
                order_total = order.total_amount,
                "gateway echoed a different amount than requested"
            );
        }

        let payment_id = Uuid::new_v4();
        payment::ActiveModel {
            id: Set(payment_id),
            order_id: Set(order.id),
            provider: Set(PROVIDER.to_string()),
            provider_order_id: Set(intent.id.clone()),
            provider_payment_id: Set(None),
            provider_signature: Set(None),
            status: Set(PaymentStatus::Created.as_str().to_string()),
            amount: Set(order.total_amount),
            currency: Set(order.currency.clone()),
            raw: Set(Some(intent.raw)),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send(Event::PaymentIntentCreated {
                order_id: order.id,
                payment_id,
            })
            .await;

        Ok(CreateIntentResponse {
            provider_order_id: intent.id,
            amount: order.total_amount,
            currency: order.currency,
            key_id,
            order_id: order.id,
        })
    }

    /// Verifies a client payment confirmation signature and records the
    /// authorization on the payment row.
    ///
    /// This path is advisory only: it never touches the order's payment
    /// status. Settlement truth arrives exclusively through the webhook
    /// reconciler.
    #[instrument(skip(self, request), fields(user_id = %user_id, order_id = %request.order_id))]
    pub async fn verify_client_payment(
        &self,
        user_id: Uuid,
        request: VerifyPaymentRequest,
    ) -> Result<(), ServiceError> {
        request.validate()?;
        let order = self.load_payable_order(user_id, request.order_id).await?;

        // A missing gateway secret is indistinguishable from a bad signature
        // on purpose: the check fails closed.
        let key_secret = match self.gateway.key_secret() {
            Ok(secret) => secret,
            Err(_) => {
                warn!("payment signature check attempted without gateway credentials");
                return Err(ServiceError::BadRequest(
                    "Invalid payment signature.".to_string(),
                ));
            }
        };
        if !verify_payment_signature(
            &key_secret,
            &request.provider_order_id,
            &request.provider_payment_id,
            &request.provider_signature,
        ) {
            warn!("rejected client payment confirmation with bad signature");
            return Err(ServiceError::BadRequest(
                "Invalid payment signature.".to_string(),
            ));
        }

        let now = Utc::now();
        let existing = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order.id))
            .filter(payment::Column::Provider.eq(PROVIDER))
            .filter(payment::Column::ProviderOrderId.eq(request.provider_order_id.as_str()))
            .one(&*self.db)
            .await?;

        match existing {
            Some(row) => {
                // Only `created` may advance here; a row the reconciler has
                // already settled is left untouched.
                payment::Entity::update_many()
                    .col_expr(
                        payment::Column::Status,
                        Expr::value(PaymentStatus::Authorized.as_str()),
                    )
                    .col_expr(
                        payment::Column::ProviderPaymentId,
                        Expr::value(request.provider_payment_id.clone()),
                    )
                    .col_expr(
                        payment::Column::ProviderSignature,
                        Expr::value(request.provider_signature.clone()),
                    )
                    .col_expr(payment::Column::UpdatedAt, Expr::value(now))
                    .filter(payment::Column::Id.eq(row.id))
                    .filter(payment::Column::Status.eq(PaymentStatus::Created.as_str()))
                    .exec(&*self.db)
                    .await?;
            }
            None => {
                // Confirmation for an intent this instance never saw created,
                // e.g. after a redeploy. Record it so reconciliation can match.
                payment::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order.id),
                    provider: Set(PROVIDER.to_string()),
                    provider_order_id: Set(request.provider_order_id.clone()),
                    provider_payment_id: Set(Some(request.provider_payment_id.clone())),
                    provider_signature: Set(Some(request.provider_signature.clone())),
                    status: Set(PaymentStatus::Authorized.as_str().to_string()),
                    amount: Set(order.total_amount),
                    currency: Set(order.currency.clone()),
                    raw: Set(None),
                    created_at: Set(now),
                    updated_at: Set(None),
                }
                .insert(&*self.db)
                .await?;
            }
        }

        self.event_sender
            .send(Event::PaymentAuthorized(order.id))
            .await;
        Ok(())
    }
}

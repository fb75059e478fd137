//! Webhook reconciliation: the only path that settles payments.
//!
//! Every delivery is recorded in the `payment_events` ledger before its
//! effects run. The unique index on `(provider, event_id)` makes concurrent
//! redeliveries collapse to a single processing attempt; state effects are
//! conditional single-statement updates, so replays and out-of-order
//! deliveries are no-ops rather than regressions.

use crate::{
    db::DbPool,
    entities::{payment, payment_event},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::PROVIDER,
    models::{EventProcessingStatus, PaymentStatus},
    services::orders::OrderService,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, SqlErr,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Final disposition of one webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Effects were applied (or re-confirmed) for a recognized event.
    Processed,
    /// Recognized envelope, but an event type this service does not act on.
    Ignored,
    /// A delivery of an event id that already reached a terminal state.
    Duplicate,
}

#[derive(Debug, Default, Deserialize)]
struct EntityWrapper<T> {
    #[serde(default)]
    entity: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentEntity {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    order_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OrderEntity {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopePayload {
    #[serde(default)]
    payment: Option<EntityWrapper<PaymentEntity>>,
    #[serde(default)]
    order: Option<EntityWrapper<OrderEntity>>,
}

/// The provider's webhook envelope, parsed leniently: every field is
/// optional so an unfamiliar event shape still reaches the ledger.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    payload: Option<EnvelopePayload>,
}

impl WebhookEnvelope {
    fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("unknown")
    }

    fn provider_payment_id(&self) -> Option<&str> {
        self.payload
            .as_ref()?
            .payment
            .as_ref()?
            .entity
            .as_ref()?
            .id
            .as_deref()
    }

    fn provider_order_id(&self) -> Option<&str> {
        let payload = self.payload.as_ref()?;
        payload
            .payment
            .as_ref()
            .and_then(|p| p.entity.as_ref())
            .and_then(|e| e.order_id.as_deref())
            .or_else(|| {
                payload
                    .order
                    .as_ref()
                    .and_then(|o| o.entity.as_ref())
                    .and_then(|e| e.id.as_deref())
            })
    }

    /// Deterministic event id for providers that omit one, so redeliveries
    /// of the same underlying event still collide in the ledger.
    fn event_id(&self) -> String {
        if let Some(id) = self.id.as_deref() {
            if !id.is_empty() {
                return id.to_string();
            }
        }
        let anchor = self
            .provider_payment_id()
            .or_else(|| self.provider_order_id())
            .unwrap_or("unknown");
        let created_at = self.created_at.unwrap_or(0);
        format!("{}:{}:{}", self.event_type(), anchor, created_at)
    }
}

/// Settlement instruction extracted from an envelope.
#[derive(Debug, PartialEq, Eq)]
enum GatewayEvent {
    PaymentCaptured,
    PaymentFailed,
    Unknown,
}

impl GatewayEvent {
    fn classify(event_type: &str) -> Self {
        match event_type {
            // `order.paid` carries the same settlement fact as
            // `payment.captured`; both resolve through the payment row.
            "payment.captured" | "order.paid" => GatewayEvent::PaymentCaptured,
            "payment.failed" => GatewayEvent::PaymentFailed,
            _ => GatewayEvent::Unknown,
        }
    }
}

struct EffectResult {
    order_id: Option<Uuid>,
    handled: bool,
}

#[derive(Clone)]
pub struct WebhookService {
    db: Arc<DbPool>,
    orders: Arc<OrderService>,
    event_sender: EventSender,
}

impl WebhookService {
    pub fn new(db: Arc<DbPool>, orders: Arc<OrderService>, event_sender: EventSender) -> Self {
        Self {
            db,
            orders,
            event_sender,
        }
    }

    /// Processes one signature-verified delivery end to end: ledger entry,
    /// effects, terminal ledger update.
    ///
    /// Returns `Err` only when effects could not be applied; the ledger row is
    /// then left `failed` so the provider's retry gets a full second attempt.
    #[instrument(skip(self, body))]
    pub async fn process_delivery(&self, body: &[u8]) -> Result<WebhookOutcome, ServiceError> {
        let raw: Value = serde_json::from_slice(body).map_err(|_| {
            ServiceError::BadRequest("Webhook body is not valid JSON.".to_string())
        })?;
        let envelope: WebhookEnvelope =
            serde_json::from_value(raw.clone()).map_err(|_| {
                ServiceError::BadRequest("Unrecognized webhook envelope.".to_string())
            })?;

        let event_id = envelope.event_id();
        let event_type = envelope.event_type().to_string();

        if let Some(existing) = payment_event::Entity::find()
            .filter(payment_event::Column::Provider.eq(PROVIDER))
            .filter(payment_event::Column::EventId.eq(event_id.as_str()))
            .one(&*self.db)
            .await?
        {
            if EventProcessingStatus::is_terminal(&existing.processing_status) {
                info!(event_id = %event_id, "duplicate webhook delivery acknowledged");
                return Ok(WebhookOutcome::Duplicate);
            }
            // A `failed` (or orphaned `received`) row: retry in full.
            warn!(event_id = %event_id, status = %existing.processing_status,
                  "retrying previously unfinished webhook event");
        } else {
            let inserted = payment_event::ActiveModel {
                id: Set(Uuid::new_v4()),
                provider: Set(PROVIDER.to_string()),
                event_id: Set(event_id.clone()),
                event_type: Set(event_type.clone()),
                payload: Set(raw.clone()),
                processing_status: Set(EventProcessingStatus::Received.as_str().to_string()),
                order_id: Set(None),
                error: Set(None),
                received_at: Set(Utc::now()),
                processed_at: Set(None),
            }
            .insert(&*self.db)
            .await;
            if let Err(db_err) = inserted {
                if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    // Lost the race to a concurrent delivery of the same event.
                    info!(event_id = %event_id, "concurrent duplicate webhook delivery acknowledged");
                    return Ok(WebhookOutcome::Duplicate);
                }
                return Err(db_err.into());
            }
        }

        match self.apply_effects(&envelope, &raw).await {
            Ok(effect) => {
                let status = if effect.handled {
                    EventProcessingStatus::Processed
                } else {
                    EventProcessingStatus::Ignored
                };
                self.finish_ledger_entry(&event_id, status, effect.order_id, None)
                    .await?;
                info!(event_id = %event_id, event_type = %event_type,
                      outcome = status.as_str(), "webhook delivery settled");
                Ok(if effect.handled {
                    WebhookOutcome::Processed
                } else {
                    WebhookOutcome::Ignored
                })
            }
            Err(err) => {
                error!(event_id = %event_id, event_type = %event_type, error = %err,
                       "webhook effects failed");
                self.finish_ledger_entry(
                    &event_id,
                    EventProcessingStatus::Failed,
                    None,
                    Some(err.to_string()),
                )
                .await?;
                // Propagate so the handler answers 5xx and the provider retries.
                Err(err)
            }
        }
    }

    async fn finish_ledger_entry(
        &self,
        event_id: &str,
        status: EventProcessingStatus,
        order_id: Option<Uuid>,
        error_detail: Option<String>,
    ) -> Result<(), ServiceError> {
        let mut update = payment_event::Entity::update_many()
            .col_expr(
                payment_event::Column::ProcessingStatus,
                Expr::value(status.as_str()),
            )
            .col_expr(payment_event::Column::ProcessedAt, Expr::value(Utc::now()))
            .col_expr(payment_event::Column::Error, Expr::value(error_detail));
        if let Some(order_id) = order_id {
            update = update.col_expr(payment_event::Column::OrderId, Expr::value(order_id));
        }
        update
            .filter(payment_event::Column::Provider.eq(PROVIDER))
            .filter(payment_event::Column::EventId.eq(event_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Locates the payment row the envelope refers to, preferring the
    /// provider order id over the provider payment id.
    async fn resolve_payment(
        &self,
        envelope: &WebhookEnvelope,
    ) -> Result<Option<payment::Model>, ServiceError> {
        if let Some(provider_order_id) = envelope.provider_order_id() {
            let found = payment::Entity::find()
                .filter(payment::Column::Provider.eq(PROVIDER))
                .filter(payment::Column::ProviderOrderId.eq(provider_order_id))
                .one(&*self.db)
                .await?;
            if found.is_some() {
                return Ok(found);
            }
        }
        if let Some(provider_payment_id) = envelope.provider_payment_id() {
            let found = payment::Entity::find()
                .filter(payment::Column::Provider.eq(PROVIDER))
                .filter(payment::Column::ProviderPaymentId.eq(provider_payment_id))
                .one(&*self.db)
                .await?;
            return Ok(found);
        }
        Ok(None)
    }

    async fn apply_effects(
        &self,
        envelope: &WebhookEnvelope,
        raw: &Value,
    ) -> Result<EffectResult, ServiceError> {
        let event = GatewayEvent::classify(envelope.event_type());
        let resolved = self.resolve_payment(envelope).await?;

        match event {
            GatewayEvent::PaymentCaptured => {
                let row = resolved.ok_or_else(|| {
                    ServiceError::InternalError(
                        "Payment record not found for capture event.".to_string(),
                    )
                })?;
                self.settle_payment(&row, PaymentStatus::Captured, envelope, raw)
                    .await?;
                self.orders.mark_paid_if_unpaid(row.order_id).await?;
                self.orders.confirm_if_pending(row.order_id).await?;
                self.event_sender
                    .send(Event::PaymentCaptured(row.order_id))
                    .await;
                Ok(EffectResult {
                    order_id: Some(row.order_id),
                    handled: true,
                })
            }
            GatewayEvent::PaymentFailed => {
                let row = resolved.ok_or_else(|| {
                    ServiceError::InternalError(
                        "Payment record not found for failure event.".to_string(),
                    )
                })?;
                self.settle_payment(&row, PaymentStatus::Failed, envelope, raw)
                    .await?;
                self.orders
                    .mark_payment_failed_unless_paid(row.order_id)
                    .await?;
                self.event_sender
                    .send(Event::PaymentFailed(row.order_id))
                    .await;
                Ok(EffectResult {
                    order_id: Some(row.order_id),
                    handled: true,
                })
            }
            GatewayEvent::Unknown => {
                info!(event_type = %envelope.event_type(), "ignoring unhandled webhook event type");
                Ok(EffectResult {
                    order_id: resolved.map(|r| r.order_id),
                    handled: false,
                })
            }
        }
    }

    /// Writes the settlement outcome onto the payment row. Capture wins over
    /// failure: a row already `captured` is never demoted.
    async fn settle_payment(
        &self,
        row: &payment::Model,
        status: PaymentStatus,
        envelope: &WebhookEnvelope,
        raw: &Value,
    ) -> Result<(), ServiceError> {
        let mut update = payment::Entity::update_many()
            .col_expr(payment::Column::Status, Expr::value(status.as_str()))
            .col_expr(payment::Column::Raw, Expr::value(raw.clone()))
            .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()));
        if let Some(provider_payment_id) = envelope.provider_payment_id() {
            update = update.col_expr(
                payment::Column::ProviderPaymentId,
                Expr::value(provider_payment_id),
            );
        }
        update
            .filter(payment::Column::Id.eq(row.id))
            .filter(payment::Column::Status.ne(PaymentStatus::Captured.as_str()))
            .exec(&*self.db)
            .await?;
        Ok(())
    }
}

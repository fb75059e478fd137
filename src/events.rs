//! Domain events emitted by the order and payment services.
//!
//! Events are best-effort operator signals; the payment_events ledger, not
//! this channel, is the durable record of webhook processing.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderConfirmed(Uuid),
    PaymentIntentCreated { order_id: Uuid, payment_id: Uuid },
    PaymentAuthorized(Uuid),
    PaymentCaptured(Uuid),
    PaymentFailed(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, logging (not failing) when the processor is gone.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "failed to enqueue domain event");
        }
    }
}

/// Background consumer for the event channel.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "order created");
            }
            Event::OrderConfirmed(order_id) => {
                info!(order_id = %order_id, "order confirmed");
            }
            Event::PaymentIntentCreated {
                order_id,
                payment_id,
            } => {
                info!(order_id = %order_id, payment_id = %payment_id, "payment intent created");
            }
            Event::PaymentAuthorized(order_id) => {
                info!(order_id = %order_id, "payment authorized");
            }
            Event::PaymentCaptured(order_id) => {
                info!(order_id = %order_id, "payment captured");
            }
            Event::PaymentFailed(order_id) => {
                info!(order_id = %order_id, "payment failed");
            }
        }
    }
}

//! Typed status vocabularies for orders, payments and the webhook ledger.
//!
//! The entities persist these as plain strings; the services only ever go
//! through these enums so a typo cannot produce an unknown state.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Fulfillment lifecycle of an order. Only `pending -> confirmed` is driven
/// by payment capture; the later stages are advanced manually by the back
/// office and are not guarded here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Packed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Packed => "packed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// Payment state of an order as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderPaymentStatus {
    Unpaid,
    Paid,
    Failed,
    Refunded,
}

impl OrderPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPaymentStatus::Unpaid => "unpaid",
            OrderPaymentStatus::Paid => "paid",
            OrderPaymentStatus::Failed => "failed",
            OrderPaymentStatus::Refunded => "refunded",
        }
    }

    /// States from which a new payment attempt may be started.
    pub fn is_payable(value: &str) -> bool {
        value == OrderPaymentStatus::Unpaid.as_str()
            || value == OrderPaymentStatus::Failed.as_str()
    }
}

/// State of a single gateway payment intent.
///
/// The client confirmation path may only reach `Authorized`; `Captured` and
/// `Failed` are reserved for the webhook reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Created,
    Authorized,
    Captured,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Intents that can still be handed back to the client for checkout.
    pub fn is_reusable(value: &str) -> bool {
        value == PaymentStatus::Created.as_str() || value == PaymentStatus::Authorized.as_str()
    }
}

/// Outcome of processing one webhook delivery.
///
/// `Processed` and `Ignored` are terminal; a `Failed` row is retried in full
/// on redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EventProcessingStatus {
    Received,
    Processed,
    Ignored,
    Failed,
}

impl EventProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventProcessingStatus::Received => "received",
            EventProcessingStatus::Processed => "processed",
            EventProcessingStatus::Ignored => "ignored",
            EventProcessingStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(value: &str) -> bool {
        value == EventProcessingStatus::Processed.as_str()
            || value == EventProcessingStatus::Ignored.as_str()
    }
}

/// Payment method selected at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Razorpay,
    Payu,
    Stripe,
    Cod,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Razorpay => "razorpay",
            PaymentMethod::Payu => "payu",
            PaymentMethod::Stripe => "stripe",
            PaymentMethod::Cod => "cod",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "razorpay" => Some(PaymentMethod::Razorpay),
            "payu" => Some(PaymentMethod::Payu),
            "stripe" => Some(PaymentMethod::Stripe),
            "cod" => Some(PaymentMethod::Cod),
            _ => None,
        }
    }

    /// Whether this method settles through the online gateway flow.
    pub fn is_online_gateway(&self) -> bool {
        matches!(self, PaymentMethod::Razorpay)
    }
}

//! OpenAPI document served at `/docs`.

use crate::{entities, errors, handlers, models, services};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        description = "Order placement and payment reconciliation for an apparel storefront"
    ),
    paths(
        handlers::orders::create_order,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::get_order_items,
        handlers::payments::create_payment_intent,
        handlers::payments::verify_payment,
        handlers::payment_webhooks::razorpay_webhook,
    ),
    components(schemas(
        errors::ErrorResponse,
        entities::order::Model,
        entities::order_item::Model,
        models::OrderStatus,
        models::OrderPaymentStatus,
        models::PaymentStatus,
        models::PaymentMethod,
        services::orders::PlaceOrderRequest,
        services::orders::CartItemInput,
        services::orders::ShippingInput,
        services::orders::PlaceOrderResponse,
        services::payments::CreateIntentRequest,
        services::payments::CreateIntentResponse,
        services::payments::VerifyPaymentRequest,
        handlers::payments::VerifyPaymentResponse,
        handlers::payment_webhooks::WebhookAck,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "orders", description = "Order creation and retrieval"),
        (name = "payments", description = "Gateway intents and client confirmation"),
        (name = "webhooks", description = "Gateway settlement callbacks")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

//! Order placement and payment reconciliation backend for an apparel
//! storefront.
//!
//! Orders are priced server-side from the catalog; payment settlement is
//! driven exclusively by signature-verified gateway webhooks, recorded in an
//! idempotency ledger so redeliveries are harmless.

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod rate_limiter;
pub mod services;

use crate::{
    auth::AuthService,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    gateway::PaymentGateway,
    rate_limiter::RateLimiter,
    services::{orders::OrderService, payments::PaymentService, webhooks::WebhookService},
};
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// The service layer, shared across handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub webhooks: Arc<WebhookService>,
}

impl AppServices {
    pub fn build(
        db: Arc<DbPool>,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
    ) -> Self {
        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            config.default_currency.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            gateway,
            event_sender.clone(),
        ));
        let webhooks = Arc::new(WebhookService::new(db, orders.clone(), event_sender));
        Self {
            orders,
            payments,
            webhooks,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub services: AppServices,
    pub rate_limiter: RateLimiter,
    pub auth: Arc<AuthService>,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    name: &'static str,
    version: &'static str,
    environment: String,
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn api_status(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<StatusBody> {
    Json(StatusBody {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
    })
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(request).await;
    info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}

/// Versioned API surface.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route(
            "/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/items", get(handlers::orders::get_order_items))
        .route(
            "/payments/create",
            post(handlers::payments::create_payment_intent),
        )
        .route(
            "/payments/verify",
            post(handlers::payments::verify_payment),
        )
        .route(
            "/webhooks/razorpay",
            post(handlers::payment_webhooks::razorpay_webhook),
        )
}

/// Builds the complete application router.
pub fn app_router(state: AppState) -> Router {
    let cors = match state.config.cors_allowed_origins.as_deref() {
        Some(origins) => {
            let parsed: Vec<_> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(parsed)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        }
        None => CorsLayer::permissive(),
    };

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .merge(
            SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(middleware::from_fn(log_request))
        .layer(Extension(state.auth.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

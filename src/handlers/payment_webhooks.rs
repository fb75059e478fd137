use crate::{
    errors::{ErrorResponse, ServiceError},
    gateway::signature::verify_webhook_signature,
    handlers::enforce_rate_limit,
    services::webhooks::WebhookOutcome,
    AppState,
};
use axum::{body::Bytes as RawBytes, extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub ok: bool,
    pub status: String,
}

/// Gateway webhook intake. The sole authority for settling payments.
///
/// The signature covers the exact raw body bytes, so the body is taken
/// unparsed and only deserialized after verification.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/razorpay",
    responses(
        (status = 200, description = "Delivery acknowledged", body = WebhookAck),
        (status = 400, description = "Unparseable body", body = ErrorResponse),
        (status = 401, description = "Missing or invalid signature", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 500, description = "Effects failed; provider should retry", body = ErrorResponse)
    ),
    tag = "webhooks"
)]
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: RawBytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    enforce_rate_limit(
        &state,
        "webhooks:razorpay",
        &headers,
        state.config.webhook_rate_limit,
    )
    .await?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ServiceError::Unauthorized("Missing webhook signature.".to_string())
        })?;

    // Fail closed: without a configured secret nothing can be trusted.
    let secret = state
        .config
        .razorpay_webhook_secret
        .as_deref()
        .unwrap_or_default();
    if !verify_webhook_signature(secret, &body, signature) {
        warn!("rejected webhook delivery with bad signature");
        return Err(ServiceError::Unauthorized(
            "Invalid webhook signature.".to_string(),
        ));
    }

    let outcome = state.services.webhooks.process_delivery(&body).await?;
    let status = match outcome {
        WebhookOutcome::Processed => "processed",
        WebhookOutcome::Ignored => "ignored",
        WebhookOutcome::Duplicate => "duplicate",
    };
    Ok(Json(WebhookAck {
        ok: true,
        status: status.to_string(),
    }))
}

use crate::{
    auth::AuthenticatedUser,
    errors::{ErrorResponse, ServiceError},
    handlers::enforce_rate_limit,
    services::payments::{CreateIntentRequest, CreateIntentResponse, VerifyPaymentRequest},
    AppState,
};
use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub ok: bool,
    pub message: String,
}

/// Create (or reuse) a gateway payment intent for an order.
#[utoipa::path(
    post,
    path = "/api/v1/payments/create",
    request_body = CreateIntentRequest,
    responses(
        (status = 200, description = "Intent ready for checkout", body = CreateIntentResponse),
        (status = 401, description = "Login required", body = ErrorResponse),
        (status = 403, description = "Order belongs to another user", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order not payable", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 500, description = "Gateway unavailable or misconfigured", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: AuthenticatedUser,
    Json(request): Json<CreateIntentRequest>,
) -> Result<Json<CreateIntentResponse>, ServiceError> {
    enforce_rate_limit(
        &state,
        "payments:create",
        &headers,
        state.config.payment_create_rate_limit,
    )
    .await?;

    let response = state
        .services
        .payments
        .create_intent(user.user_id, request.order_id)
        .await?;
    Ok(Json(response))
}

/// Verify the gateway's client-side payment confirmation.
///
/// A success response means the signature checked out, not that money
/// moved; settlement arrives later via webhook.
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Signature verified", body = VerifyPaymentResponse),
        (status = 400, description = "Invalid payment signature", body = ErrorResponse),
        (status = 401, description = "Login required", body = ErrorResponse),
        (status = 403, description = "Order belongs to another user", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order not payable", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: AuthenticatedUser,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, ServiceError> {
    enforce_rate_limit(
        &state,
        "payments:verify",
        &headers,
        state.config.payment_verify_rate_limit,
    )
    .await?;

    state
        .services
        .payments
        .verify_client_payment(user.user_id, request)
        .await?;
    Ok(Json(VerifyPaymentResponse {
        ok: true,
        message: "Payment received. Awaiting confirmation.".to_string(),
    }))
}

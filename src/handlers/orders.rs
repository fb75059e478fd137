use crate::{
    auth::AuthenticatedUser,
    entities::{order, order_item},
    errors::{ErrorResponse, ServiceError},
    services::orders::{PlaceOrderRequest, PlaceOrderResponse},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

/// Create a new order from the caller's cart.
///
/// Prices and availability are re-derived from the catalog; the client's
/// displayed prices are never trusted.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order created", body = PlaceOrderResponse),
        (status = 400, description = "Invalid cart or shipping details", body = ErrorResponse),
        (status = 401, description = "Login required", body = ErrorResponse),
        (status = 404, description = "A cart product does not exist", body = ErrorResponse),
        (status = 409, description = "Product inactive or out of stock", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlaceOrderResponse>), ServiceError> {
    let response = state
        .services
        .orders
        .create_order(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Fetch one of the caller's orders.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order found", body = order::Model),
        (status = 403, description = "Order belongs to another user", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<order::Model>, ServiceError> {
    let order = state
        .services
        .orders
        .get_owned_order(user.user_id, order_id)
        .await?;
    Ok(Json(order))
}

/// Line items of one of the caller's orders, priced as at purchase time.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/items",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order items", body = [order_item::Model]),
        (status = 403, description = "Order belongs to another user", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn get_order_items(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<order_item::Model>>, ServiceError> {
    let items = state
        .services
        .orders
        .get_order_items(user.user_id, order_id)
        .await?;
    Ok(Json(items))
}

/// All of the caller's orders, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses(
        (status = 200, description = "Orders for the caller", body = [order::Model]),
        (status = 401, description = "Login required", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<order::Model>>, ServiceError> {
    let orders = state.services.orders.list_orders(user.user_id).await?;
    Ok(Json(orders))
}

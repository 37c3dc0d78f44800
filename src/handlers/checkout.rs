use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::order::PaymentMethod,
    errors::ApiError,
    handlers::common::{created_response, map_service_error, success_response, validate_input},
    services::{
        checkout::{PlaceOrderInput, VerifyPaymentInput},
        pricing::CartLine,
    },
    AppState,
};

/// Routes driving the checkout wizard's final step and the gateway's
/// browser-side callbacks.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(place_order))
        .route("/orders/:id/verify", post(verify_payment))
        .route("/orders/:id/payment-failed", post(payment_failed))
        .route("/orders/:id/payment-cancelled", post(payment_cancelled))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderRequest {
    pub customer_id: Uuid,
    /// One of the customer's saved addresses, snapshotted into the order.
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    #[validate(length(min = 1, message = "Cart must contain at least one item"))]
    pub items: Vec<CartLine>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PaymentFailureRequest {
    #[serde(default)]
    pub error: Option<String>,
}

/// Place an order from a cart snapshot
#[utoipa::path(
    post,
    path = "/api/v1/checkout/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order placed"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment initialization failed", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn place_order(
    State(state): State<AppState>,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let placed = state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id: payload.customer_id,
            address_id: payload.address_id,
            payment_method: payload.payment_method,
            items: payload.items,
        })
        .await
        .map_err(map_service_error)?;

    Ok(created_response(placed))
}

/// Gateway success callback: verify the payment signature and confirm
#[utoipa::path(
    post,
    path = "/api/v1/checkout/orders/{id}/verify",
    request_body = VerifyPaymentRequest,
    params(("id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Payment verified, order confirmed"),
        (status = 401, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .checkout
        .verify_and_confirm(VerifyPaymentInput {
            order_id,
            gateway_order_id: payload.gateway_order_id,
            gateway_payment_id: payload.gateway_payment_id,
            signature: payload.signature,
        })
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Gateway failure callback
#[utoipa::path(
    post,
    path = "/api/v1/checkout/orders/{id}/payment-failed",
    request_body = PaymentFailureRequest,
    params(("id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Failure recorded"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn payment_failed(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(payload): Json<PaymentFailureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .checkout
        .record_payment_failure(&order_id, payload.error)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Customer dismissed the gateway UI
#[utoipa::path(
    post,
    path = "/api/v1/checkout/orders/{id}/payment-cancelled",
    params(("id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Cancellation recorded"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn payment_cancelled(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .checkout
        .record_payment_cancelled(&order_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

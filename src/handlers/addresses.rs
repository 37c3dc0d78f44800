use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

use crate::{
    errors::ApiError,
    handlers::common::{created_response, map_service_error, success_response},
    services::addresses::{AddressInput, AddressResponse},
    AppState,
};

pub fn address_routes() -> Router<AppState> {
    Router::new().route(
        "/:customer_id/addresses",
        get(list_addresses).post(create_address),
    )
}

/// List a customer's saved addresses
#[utoipa::path(
    get,
    path = "/api/v1/customers/{customer_id}/addresses",
    params(("customer_id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Saved addresses", body = [AddressResponse])
    ),
    tag = "Addresses"
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let addresses = state
        .services
        .addresses
        .list_for_customer(customer_id)
        .await
        .map_err(map_service_error)?;

    let responses: Vec<AddressResponse> = addresses.into_iter().map(Into::into).collect();
    Ok(success_response(responses))
}

/// Save a new delivery address
#[utoipa::path(
    post,
    path = "/api/v1/customers/{customer_id}/addresses",
    request_body = AddressInput,
    params(("customer_id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 201, description = "Address saved", body = AddressResponse),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse)
    ),
    tag = "Addresses"
)]
pub async fn create_address(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<AddressInput>,
) -> Result<impl IntoResponse, ApiError> {
    let saved = state
        .services
        .addresses
        .save(customer_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(AddressResponse::from(saved)))
}

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.3.0",
        description = "Order placement, payment settlement, and order tracking for the storefront.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    tags(
        (name = "Checkout", description = "Order placement and payment callbacks"),
        (name = "Orders", description = "Order reads for confirmation and tracking"),
        (name = "Addresses", description = "Saved delivery addresses")
    ),
    paths(
        crate::handlers::checkout::place_order,
        crate::handlers::checkout::verify_payment,
        crate::handlers::checkout::payment_failed,
        crate::handlers::checkout::payment_cancelled,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::addresses::list_addresses,
        crate::handlers::addresses::create_address,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::order::PaymentMethod,
            crate::services::pricing::CartLine,
            crate::services::pricing::OrderSummary,
            crate::services::orders::Order,
            crate::services::orders::OrderListPage,
            crate::services::addresses::AddressSnapshot,
            crate::services::addresses::AddressInput,
            crate::services::addresses::AddressResponse,
            crate::services::checkout::GatewayHandoff,
            crate::services::checkout::PlacedOrder,
            crate::handlers::checkout::PlaceOrderRequest,
            crate::handlers::checkout::VerifyPaymentRequest,
            crate::handlers::checkout::PaymentFailureRequest,
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_generates() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().expect("openapi serializes");
        assert!(json.contains("/api/v1/checkout/orders"));
        assert!(json.contains("/api/v1/orders/{id}"));
    }
}

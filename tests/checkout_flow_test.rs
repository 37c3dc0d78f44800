//! End-to-end checkout flows: cash-on-delivery confirmation, the online
//! payment state machine, signature verification, and the failure branches.

mod common;

use axum::http::Method;
use common::{response_json, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

fn cart_below_free_shipping() -> Value {
    // subtotal 400, tax 72, shipping 50, total 522
    json!([{ "product_id": "prod-1", "name": "Widget", "price": 200, "quantity": 2 }])
}

fn cart_with_free_shipping() -> Value {
    // subtotal 600, tax 108, shipping 0, total 708
    json!([{ "product_id": "prod-2", "name": "Gadget", "price": 300, "quantity": 2 }])
}

async fn place_order(app: &TestApp, customer_id: Uuid, method: &str, items: Value) -> Value {
    let address_id = app.seed_address(customer_id).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/orders",
            Some(json!({
                "customer_id": customer_id,
                "address_id": address_id,
                "payment_method": method,
                "items": items,
            })),
        )
        .await;
    assert_eq!(response.status(), 201, "order placement should succeed");
    response_json(response).await
}

// ==================== Cash on delivery ====================

#[tokio::test]
async fn cod_order_confirms_immediately() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let body = place_order(&app, customer_id, "cash_on_delivery", cart_with_free_shipping()).await;

    let order = &body["order"];
    assert_eq!(order["status"], "confirmed");
    assert_eq!(order["payment_status"], "pending_cod");
    assert_eq!(order["payment_method"], "cash_on_delivery");
    assert_eq!(order["summary"]["subtotal"], 600);
    assert_eq!(order["summary"]["tax"], 108);
    assert_eq!(order["summary"]["shipping"], 0);
    assert_eq!(order["summary"]["total"], 708);
    assert!(body["payment"].is_null());

    // The ledger read must agree with the placement response.
    let order_id = order["id"].as_str().expect("order id");
    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(response.status(), 200);
    let fetched = response_json(response).await;
    assert_eq!(fetched["status"], "confirmed");
    assert_eq!(fetched["payment_status"], "pending_cod");
}

#[tokio::test]
async fn cod_order_snapshots_address_and_items() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let body = place_order(&app, customer_id, "cash_on_delivery", cart_below_free_shipping()).await;

    let order = &body["order"];
    assert_eq!(order["shipping_address"]["city"], "Bengaluru");
    assert_eq!(order["shipping_address"]["postal_code"], "560001");
    assert_eq!(order["items"][0]["name"], "Widget");
    assert_eq!(order["items"][0]["quantity"], 2);
    assert_eq!(order["summary"]["total"], 522);
}

// ==================== Online payment happy path ====================

#[tokio::test]
async fn online_order_awaits_payment_with_gateway_handoff() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let body = place_order(&app, customer_id, "online", cart_below_free_shipping()).await;

    let order = &body["order"];
    assert_eq!(order["status"], "pending_payment");
    assert_eq!(order["payment_status"], "pending");
    assert_eq!(order["gateway_order_id"], "gw_order_0");
    assert!(order["gateway_payment_id"].is_null());

    let payment = &body["payment"];
    assert_eq!(payment["gateway_order_id"], "gw_order_0");
    assert_eq!(payment["amount"], 522);
    assert_eq!(payment["currency"], "INR");
    assert_eq!(payment["key_id"], "key_test_1");

    // The intent must be sized to the stored order total.
    let intents = app.gateway.intents.lock().await;
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].amount, 522);
    assert_eq!(intents[0].order_id, order["id"].as_str().unwrap());
}

#[tokio::test]
async fn verified_payment_confirms_order() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let body = place_order(&app, customer_id, "online", cart_below_free_shipping()).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();
    let gateway_order_id = body["payment"]["gateway_order_id"].as_str().unwrap();

    let signature = app.signer().sign(gateway_order_id, "pay_12345");
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/orders/{}/verify", order_id),
            Some(json!({
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": "pay_12345",
                "signature": signature,
            })),
        )
        .await;
    assert_eq!(response.status(), 200);

    let confirmed = response_json(response).await;
    assert_eq!(confirmed["status"], "confirmed");
    assert_eq!(confirmed["payment_status"], "completed");
    assert_eq!(confirmed["gateway_payment_id"], "pay_12345");
}

#[tokio::test]
async fn duplicate_verification_is_a_noop_success() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let body = place_order(&app, customer_id, "online", cart_below_free_shipping()).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();
    let gateway_order_id = body["payment"]["gateway_order_id"]
        .as_str()
        .unwrap()
        .to_string();

    let signature = app.signer().sign(&gateway_order_id, "pay_12345");
    let payload = json!({
        "gateway_order_id": gateway_order_id,
        "gateway_payment_id": "pay_12345",
        "signature": signature,
    });

    let uri = format!("/api/v1/checkout/orders/{}/verify", order_id);
    let first = app.request(Method::POST, &uri, Some(payload.clone())).await;
    assert_eq!(first.status(), 200);
    let first_body = response_json(first).await;

    let second = app.request(Method::POST, &uri, Some(payload)).await;
    assert_eq!(second.status(), 200, "gateway retries must be accepted");
    let second_body = response_json(second).await;

    assert_eq!(first_body["status"], second_body["status"]);
    assert_eq!(
        first_body["gateway_payment_id"],
        second_body["gateway_payment_id"]
    );
    assert_eq!(first_body["updated_at"], second_body["updated_at"]);
}

// ==================== Signature tampering ====================

#[tokio::test]
async fn tampered_signature_never_confirms() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let body = place_order(&app, customer_id, "online", cart_below_free_shipping()).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();
    let gateway_order_id = body["payment"]["gateway_order_id"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/v1/checkout/orders/{}/verify", order_id);

    // Mutated signature
    let response = app
        .request(
            Method::POST,
            &uri,
            Some(json!({
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": "pay_12345",
                "signature": "0".repeat(64),
            })),
        )
        .await;
    assert_eq!(response.status(), 401);

    // Signature valid for a different payment id
    let mismatched = app.signer().sign(&gateway_order_id, "pay_other");
    let response = app
        .request(
            Method::POST,
            &uri,
            Some(json!({
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": "pay_12345",
                "signature": mismatched,
            })),
        )
        .await;
    assert_eq!(response.status(), 401);

    // Gateway order id that does not match the stored one
    let foreign = app.signer().sign("gw_order_999", "pay_12345");
    let response = app
        .request(
            Method::POST,
            &uri,
            Some(json!({
                "gateway_order_id": "gw_order_999",
                "gateway_payment_id": "pay_12345",
                "signature": foreign,
            })),
        )
        .await;
    assert_eq!(response.status(), 401);

    // After every rejection the order is untouched.
    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    let order = response_json(response).await;
    assert_eq!(order["status"], "pending_payment");
    assert_eq!(order["payment_status"], "pending");
    assert!(order["gateway_payment_id"].is_null());
}

#[tokio::test]
async fn verification_against_cod_order_fails_closed() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let body = place_order(&app, customer_id, "cash_on_delivery", cart_below_free_shipping()).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let signature = app.signer().sign("gw_order_0", "pay_12345");
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/orders/{}/verify", order_id),
            Some(json!({
                "gateway_order_id": "gw_order_0",
                "gateway_payment_id": "pay_12345",
                "signature": signature,
            })),
        )
        .await;
    assert_eq!(response.status(), 401);
}

// ==================== Failure branches ====================

#[tokio::test]
async fn gateway_failure_reported_by_provider_marks_order_failed() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let body = place_order(&app, customer_id, "online", cart_below_free_shipping()).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/orders/{}/payment-failed", order_id),
            Some(json!({ "error": "card declined" })),
        )
        .await;
    assert_eq!(response.status(), 200);

    let failed = response_json(response).await;
    assert_eq!(failed["status"], "payment_failed");
    assert_eq!(failed["payment_status"], "failed");
    assert_eq!(failed["payment_error"], "card declined");

    // The provider may re-deliver the callback.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/orders/{}/payment-failed", order_id),
            Some(json!({ "error": "card declined" })),
        )
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn dismissing_gateway_ui_cancels_payment() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let body = place_order(&app, customer_id, "online", cart_below_free_shipping()).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/orders/{}/payment-cancelled", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);

    let cancelled = response_json(response).await;
    assert_eq!(cancelled["status"], "payment_cancelled");
    assert_eq!(cancelled["payment_status"], "cancelled");

    // Re-attempting checkout starts a brand new order, never resumes the
    // cancelled one.
    let retry = place_order(&app, customer_id, "online", cart_below_free_shipping()).await;
    assert_ne!(retry["order"]["id"], cancelled["id"]);
    assert_eq!(retry["order"]["status"], "pending_payment");
}

#[tokio::test]
async fn cancelled_order_cannot_be_verified_later() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let body = place_order(&app, customer_id, "online", cart_below_free_shipping()).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();
    let gateway_order_id = body["payment"]["gateway_order_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/orders/{}/payment-cancelled", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);

    // A late success callback with a valid signature must not resurrect the
    // order: the status transition is no longer legal.
    let signature = app.signer().sign(&gateway_order_id, "pay_late");
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/orders/{}/verify", order_id),
            Some(json!({
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": "pay_late",
                "signature": signature,
            })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn gateway_outage_leaves_order_pending() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let address_id = app.seed_address(customer_id).await;

    app.gateway.fail_next();
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/orders",
            Some(json!({
                "customer_id": customer_id,
                "address_id": address_id,
                "payment_method": "online",
                "items": cart_below_free_shipping(),
            })),
        )
        .await;
    assert_eq!(response.status(), 502);

    // The abandoned pending row is accepted; it must still be discoverable.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders?customer_id={}", customer_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let page = response_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["orders"][0]["status"], "pending");
    assert_eq!(page["orders"][0]["payment_status"], "pending");
    assert!(page["orders"][0]["gateway_order_id"].is_null());
}

// ==================== Input validation ====================

#[tokio::test]
async fn empty_cart_is_rejected_before_any_write() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let address_id = app.seed_address(customer_id).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/orders",
            Some(json!({
                "customer_id": customer_id,
                "address_id": address_id,
                "payment_method": "cash_on_delivery",
                "items": [],
            })),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders?customer_id={}", customer_id),
            None,
        )
        .await;
    let page = response_json(response).await;
    assert_eq!(page["total"], 0, "no order row may exist");
}

#[tokio::test]
async fn unknown_address_is_rejected() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    app.seed_address(customer_id).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/orders",
            Some(json!({
                "customer_id": customer_id,
                "address_id": Uuid::new_v4(),
                "payment_method": "cash_on_delivery",
                "items": cart_below_free_shipping(),
            })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn another_customers_address_is_rejected() {
    let app = TestApp::new().await;
    let customer_a = Uuid::new_v4();
    let customer_b = Uuid::new_v4();
    let foreign_address = app.seed_address(customer_b).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/orders",
            Some(json!({
                "customer_id": customer_a,
                "address_id": foreign_address,
                "payment_method": "cash_on_delivery",
                "items": cart_below_free_shipping(),
            })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn unknown_order_returns_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/orders/ORD-0-MISSING", None)
        .await;
    assert_eq!(response.status(), 404);

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/orders/ORD-0-MISSING/payment-cancelled",
            None,
        )
        .await;
    assert_eq!(response.status(), 404);
}

// ==================== Addresses ====================

#[tokio::test]
async fn addresses_can_be_saved_and_listed() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/customers/{}/addresses", customer_id),
            Some(json!({
                "name": "Asha Rao",
                "phone": "9876543210",
                "street": "12 MG Road",
                "city": "Bengaluru",
                "state": "KA",
                "postal_code": "560001",
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let created = response_json(response).await;
    assert_eq!(created["country"], "IN");
    assert_eq!(created["address_type"], "home");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/customers/{}/addresses", customer_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let listed = response_json(response).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["city"], "Bengaluru");
}

#[tokio::test]
async fn address_missing_required_fields_rejected() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/customers/{}/addresses", customer_id),
            Some(json!({
                "name": "",
                "phone": "98",
                "street": "",
                "city": "Bengaluru",
                "state": "KA",
                "postal_code": "560001",
            })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

// ==================== Order snapshots are copies ====================

#[tokio::test]
async fn order_address_survives_later_address_edits() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let body = place_order(&app, customer_id, "cash_on_delivery", cart_below_free_shipping()).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    // Saving more addresses after placement must not change the snapshot.
    app.seed_address(customer_id).await;
    app.seed_address(customer_id).await;

    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    let order = response_json(response).await;
    assert_eq!(order["shipping_address"]["street"], "12 MG Road");
}

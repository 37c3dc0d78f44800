use lazy_static::lazy_static;
use prometheus::IntCounter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::order::{OrderStatus, PaymentMethod, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{CreateIntentRequest, PaymentGateway, SignatureVerifier},
    services::{
        addresses::AddressService,
        notifications::{NotificationFanout, OrderNotification},
        orders::{generate_order_id, NewOrder, Order, OrderLedger, OrderPatch},
        pricing::{CartLine, PricingService},
    },
};

lazy_static! {
    static ref ORDERS_PLACED: IntCounter =
        IntCounter::new("orders_placed_total", "Total number of orders placed")
            .expect("metric can be created");
    static ref PAYMENTS_CONFIRMED: IntCounter = IntCounter::new(
        "payments_confirmed_total",
        "Total number of online payments confirmed"
    )
    .expect("metric can be created");
    static ref PAYMENTS_FAILED: IntCounter = IntCounter::new(
        "payments_failed_total",
        "Total number of online payments that failed or were cancelled"
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone)]
pub struct PlaceOrderInput {
    pub customer_id: Uuid,
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    pub items: Vec<CartLine>,
}

/// Everything the client SDK needs to open the gateway's hosted UI.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GatewayHandoff {
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlacedOrder {
    pub order: Order,
    /// Present only for online payments still awaiting authorization.
    pub payment: Option<GatewayHandoff>,
}

#[derive(Debug, Clone)]
pub struct VerifyPaymentInput {
    pub order_id: String,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

/// Orchestrates order placement and payment settlement: persists the order,
/// drives the gateway hand-off, reconciles callbacks, and fans out
/// notifications once an order is genuinely confirmed.
#[derive(Clone)]
pub struct CheckoutService {
    ledger: Arc<OrderLedger>,
    addresses: Arc<AddressService>,
    pricing: PricingService,
    gateway: Option<Arc<dyn PaymentGateway>>,
    verifier: Option<SignatureVerifier>,
    notifications: Arc<NotificationFanout>,
    event_sender: Arc<EventSender>,
    currency: String,
    gateway_key_id: Option<String>,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<OrderLedger>,
        addresses: Arc<AddressService>,
        pricing: PricingService,
        gateway: Option<Arc<dyn PaymentGateway>>,
        verifier: Option<SignatureVerifier>,
        notifications: Arc<NotificationFanout>,
        event_sender: Arc<EventSender>,
        currency: String,
        gateway_key_id: Option<String>,
    ) -> Self {
        Self {
            ledger,
            addresses,
            pricing,
            gateway,
            verifier,
            notifications,
            event_sender,
            currency,
            gateway_key_id,
        }
    }

    /// Turn a cart snapshot into a persisted order. COD orders confirm
    /// immediately; online orders are persisted `pending`, then moved to
    /// `pending_payment` once the gateway intent exists. Every attempt mints
    /// a fresh order id, so a failed attempt can simply be retried.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id, method = ?input.payment_method))]
    pub async fn place_order(&self, input: PlaceOrderInput) -> Result<PlacedOrder, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".to_string()));
        }
        for line in &input.items {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity for {} must be at least 1",
                    line.product_id
                )));
            }
            if line.price < 0 {
                return Err(ServiceError::ValidationError(format!(
                    "price for {} must not be negative",
                    line.product_id
                )));
            }
        }

        let address = self
            .addresses
            .get_for_customer(input.customer_id, input.address_id)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError("no saved address matches the selection".to_string())
            })?;

        let summary = self.pricing.quote(&input.items);
        let (status, payment_status) = match input.payment_method {
            PaymentMethod::CashOnDelivery => (OrderStatus::Confirmed, PaymentStatus::PendingCod),
            PaymentMethod::Online => (OrderStatus::Pending, PaymentStatus::Pending),
        };

        let order = self
            .ledger
            .create(NewOrder {
                id: generate_order_id(),
                customer_id: input.customer_id,
                status,
                payment_status,
                payment_method: input.payment_method,
                items: input.items,
                shipping_address: AddressService::snapshot(&address),
                summary,
            })
            .await?;

        ORDERS_PLACED.inc();
        if let Err(e) = self
            .event_sender
            .send(Event::OrderPlaced {
                order_id: order.id.clone(),
                customer_id: order.customer_id,
                payment_method: order.payment_method,
            })
            .await
        {
            warn!(order_id = %order.id, error = %e, "failed to publish order placed event");
        }

        match order.payment_method {
            PaymentMethod::CashOnDelivery => {
                // COD is confirmed for order-status purposes; settlement is
                // tracked separately as pending_cod.
                self.notifications.dispatch(OrderNotification::from_order(&order));
                Ok(PlacedOrder {
                    order,
                    payment: None,
                })
            }
            PaymentMethod::Online => {
                let handoff = self.request_gateway_intent(&order.id).await?;
                let order = self
                    .ledger
                    .get(&order.id)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order.id)))?;
                Ok(PlacedOrder {
                    order,
                    payment: Some(handoff),
                })
            }
        }
    }

    /// Create a gateway intent sized to the *stored* order total and record
    /// it on the order before control is handed to the gateway UI. On
    /// gateway failure the order stays `pending` and the error surfaces to
    /// the caller.
    #[instrument(skip(self))]
    pub async fn request_gateway_intent(
        &self,
        order_id: &str,
    ) -> Result<GatewayHandoff, ServiceError> {
        let gateway = self.gateway.as_ref().ok_or_else(|| {
            ServiceError::ServiceUnavailable("online payments are not configured".to_string())
        })?;

        let order = self
            .ledger
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is not awaiting payment initialization",
                order_id
            )));
        }

        // The persisted total is authoritative; never re-price here.
        let intent = gateway
            .create_intent(CreateIntentRequest {
                amount: order.summary.total,
                currency: self.currency.clone(),
                order_id: order.id.clone(),
            })
            .await
            .map_err(|e| {
                warn!(order_id = %order_id, error = %e, "payment initialization failed");
                ServiceError::from(e)
            })?;

        // Recorded before the hand-off so the order is discoverable as
        // awaiting payment even if the browser never comes back.
        self.ledger
            .update(
                order_id,
                OrderPatch {
                    status: Some(OrderStatus::PendingPayment),
                    gateway_order_id: Some(intent.id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        info!(order_id = %order_id, gateway_order_id = %intent.id, "gateway intent created");

        Ok(GatewayHandoff {
            gateway_order_id: intent.id,
            amount: intent.amount,
            currency: intent.currency,
            key_id: self.gateway_key_id.clone(),
        })
    }

    /// Reconcile the gateway's success callback. The signature is recomputed
    /// server-side; on any mismatch the order is left untouched. Duplicate
    /// callbacks for an already-confirmed order are a no-op success.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn verify_and_confirm(&self, input: VerifyPaymentInput) -> Result<Order, ServiceError> {
        let verifier = self.verifier.as_ref().ok_or_else(|| {
            ServiceError::ServiceUnavailable("online payments are not configured".to_string())
        })?;

        let order = self
            .ledger
            .get(&input.order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", input.order_id)))?;

        if order.status == OrderStatus::Confirmed
            && order.gateway_order_id.as_deref() == Some(input.gateway_order_id.as_str())
            && order.gateway_payment_id.as_deref() == Some(input.gateway_payment_id.as_str())
        {
            info!(order_id = %order.id, "duplicate verification for confirmed order");
            return Ok(order);
        }

        let ids_match = order.gateway_order_id.as_deref() == Some(input.gateway_order_id.as_str());
        if !ids_match
            || !verifier.verify(
                &input.gateway_order_id,
                &input.gateway_payment_id,
                &input.signature,
            )
        {
            warn!(order_id = %order.id, "payment signature verification failed");
            return Err(ServiceError::Unauthorized(
                "payment signature verification failed".to_string(),
            ));
        }

        let order = self
            .ledger
            .update(
                &input.order_id,
                OrderPatch {
                    status: Some(OrderStatus::Confirmed),
                    payment_status: Some(PaymentStatus::Completed),
                    gateway_payment_id: Some(input.gateway_payment_id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        PAYMENTS_CONFIRMED.inc();
        if let Err(e) = self
            .event_sender
            .send(Event::OrderConfirmed {
                order_id: order.id.clone(),
            })
            .await
        {
            warn!(order_id = %order.id, error = %e, "failed to publish order confirmed event");
        }

        // Only after the confirmation write: notifications must never
        // describe an order that is not actually confirmed.
        self.notifications.dispatch(OrderNotification::from_order(&order));

        info!(order_id = %order.id, "payment verified and order confirmed");
        Ok(order)
    }

    /// Record the gateway's failure callback. The provider may re-deliver,
    /// so a repeat call on an already-failed order is a no-op.
    #[instrument(skip(self))]
    pub async fn record_payment_failure(
        &self,
        order_id: &str,
        reason: Option<String>,
    ) -> Result<Order, ServiceError> {
        let order = self
            .ledger
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status == OrderStatus::PaymentFailed {
            return Ok(order);
        }

        let order = self
            .ledger
            .update(
                order_id,
                OrderPatch {
                    status: Some(OrderStatus::PaymentFailed),
                    payment_status: Some(PaymentStatus::Failed),
                    payment_error: reason.clone(),
                    ..Default::default()
                },
            )
            .await?;

        PAYMENTS_FAILED.inc();
        if let Err(e) = self
            .event_sender
            .send(Event::PaymentFailed {
                order_id: order.id.clone(),
                reason,
            })
            .await
        {
            warn!(order_id = %order.id, error = %e, "failed to publish payment failed event");
        }

        Ok(order)
    }

    /// Record that the customer dismissed the gateway UI. No retry state is
    /// kept; a re-attempt places a brand new order.
    #[instrument(skip(self))]
    pub async fn record_payment_cancelled(&self, order_id: &str) -> Result<Order, ServiceError> {
        let order = self
            .ledger
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status == OrderStatus::PaymentCancelled {
            return Ok(order);
        }

        let order = self
            .ledger
            .update(
                order_id,
                OrderPatch {
                    status: Some(OrderStatus::PaymentCancelled),
                    payment_status: Some(PaymentStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await?;

        PAYMENTS_FAILED.inc();
        if let Err(e) = self
            .event_sender
            .send(Event::PaymentCancelled {
                order_id: order.id.clone(),
            })
            .await
        {
            warn!(order_id = %order.id, error = %e, "failed to publish payment cancelled event");
        }

        Ok(order)
    }
}

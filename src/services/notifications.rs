use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::{
    entities::order::PaymentMethod,
    services::{addresses::AddressSnapshot, orders::Order, pricing::OrderSummary},
};

/// Flattened view of an order used to render outbound messages.
#[derive(Debug, Clone, Serialize)]
pub struct OrderNotification {
    pub order_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub items: Vec<NotificationLine>,
    pub summary: OrderSummary,
    pub payment_method: PaymentMethod,
    pub shipping_address: AddressSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationLine {
    pub name: String,
    pub quantity: i64,
    pub price: i64,
}

impl OrderNotification {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            customer_name: order.shipping_address.name.clone(),
            customer_phone: order.shipping_address.phone.clone(),
            items: order
                .items
                .iter()
                .map(|line| NotificationLine {
                    name: line.name.clone(),
                    quantity: line.quantity,
                    price: line.price,
                })
                .collect(),
            summary: order.summary,
            payment_method: order.payment_method,
            shipping_address: order.shipping_address.clone(),
        }
    }
}

/// Best-effort fan-out to the customer chat channel and the team-alert
/// webhook. Both deliveries are informational: each runs in its own spawned
/// task, failures are logged and never reach the order flow.
#[derive(Clone)]
pub struct NotificationFanout {
    client: reqwest::Client,
    chat_webhook_url: Option<String>,
    team_webhook_url: Option<String>,
}

impl NotificationFanout {
    pub fn new(chat_webhook_url: Option<String>, team_webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client construction cannot fail with static options"),
            chat_webhook_url,
            team_webhook_url,
        }
    }

    /// Dispatch both channels and return immediately. Never blocks the
    /// caller and never reports failure.
    pub fn dispatch(&self, notification: OrderNotification) {
        if self.chat_webhook_url.is_none() && self.team_webhook_url.is_none() {
            info!(order_id = %notification.order_id, "no notification channels configured");
            return;
        }

        if let Some(url) = &self.chat_webhook_url {
            let body = json!({ "text": render_chat_message(&notification) });
            self.spawn_delivery("chat", url.clone(), body);
        }

        if let Some(url) = &self.team_webhook_url {
            let body = render_team_event(&notification);
            self.spawn_delivery("team", url.clone(), body);
        }
    }

    fn spawn_delivery(&self, channel: &'static str, url: String, body: Value) {
        let client = self.client.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(channel, "notification delivered");
                }
                Ok(response) => {
                    warn!(channel, status = %response.status(), "notification delivery rejected");
                }
                Err(e) => {
                    error!(channel, error = %e, "notification delivery failed");
                }
            }
        });
    }
}

fn render_chat_message(notification: &OrderNotification) -> String {
    let mut lines = Vec::with_capacity(notification.items.len() + 4);
    lines.push(format!(
        "Order {} confirmed for {} ({})",
        notification.order_id, notification.customer_name, notification.customer_phone
    ));
    for item in &notification.items {
        lines.push(format!("  {} x{} @ {}", item.name, item.quantity, item.price));
    }
    lines.push(format!(
        "Subtotal {} | Tax {} | Shipping {} | Total {}",
        notification.summary.subtotal,
        notification.summary.tax,
        notification.summary.shipping,
        notification.summary.total
    ));
    lines.push(format!("Payment: {:?}", notification.payment_method));
    lines.push(format!(
        "Ship to: {}, {}, {} {}",
        notification.shipping_address.street,
        notification.shipping_address.city,
        notification.shipping_address.state,
        notification.shipping_address.postal_code
    ));
    lines.join("\n")
}

fn render_team_event(notification: &OrderNotification) -> Value {
    json!({
        "event": "order_confirmed",
        "order_id": notification.order_id,
        "customer": {
            "name": notification.customer_name,
            "phone": notification.customer_phone,
        },
        "items": notification.items,
        "summary": notification.summary,
        "payment_method": notification.payment_method,
        "shipping_address": notification.shipping_address,
    })
}

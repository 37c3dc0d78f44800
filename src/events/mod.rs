use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::PaymentMethod;

/// Events emitted by the checkout flow. Consumers are in-process only; the
/// channel is observability plumbing, not a delivery guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: String,
        customer_id: Uuid,
        payment_method: PaymentMethod,
    },
    OrderConfirmed {
        order_id: String,
    },
    PaymentFailed {
        order_id: String,
        reason: Option<String>,
    },
    PaymentCancelled {
        order_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, logging each event. Runs until every sender is
/// dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderPlaced {
                order_id,
                customer_id,
                payment_method,
            } => {
                info!(%order_id, %customer_id, ?payment_method, "order placed");
            }
            Event::OrderConfirmed { order_id } => {
                info!(%order_id, "order confirmed");
            }
            Event::PaymentFailed { order_id, reason } => {
                warn!(%order_id, reason = reason.as_deref().unwrap_or("unspecified"), "payment failed");
            }
            Event::PaymentCancelled { order_id } => {
                info!(%order_id, "payment cancelled by customer");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::OrderConfirmed {
                order_id: "ORD-1-A".to_string(),
            })
            .await
            .expect("send should succeed");

        match rx.recv().await {
            Some(Event::OrderConfirmed { order_id }) => assert_eq!(order_id, "ORD-1-A"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let sender = EventSender::new(tx);

        let result = sender
            .send(Event::PaymentCancelled {
                order_id: "ORD-1-B".to_string(),
            })
            .await;
        assert!(result.is_err());
    }
}

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderStatus, PaymentMethod, PaymentStatus},
    errors::ServiceError,
    services::addresses::AddressSnapshot,
    services::pricing::{CartLine, OrderSummary},
};

/// Canonical order as business logic sees it. Built from the stored row by
/// [`decode_order`]; raw document JSON never leaves this module.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Order {
    pub id: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub items: Vec<CartLine>,
    pub shipping_address: AddressSnapshot,
    pub summary: OrderSummary,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub payment_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields fixed at creation time.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub items: Vec<CartLine>,
    pub shipping_address: AddressSnapshot,
    pub summary: OrderSummary,
}

/// Merge patch for an order row. Absent fields are left untouched; present
/// fields are last-write-wins per field. There is deliberately no version
/// check; DESIGN.md records the weak-consistency policy.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub payment_error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListPage {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Generate an order id before the write, so the caller knows it even if the
/// insert later fails: millisecond timestamp plus a random suffix.
pub fn generate_order_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!(
        "ORD-{}-{}",
        Utc::now().timestamp_millis(),
        suffix.to_uppercase()
    )
}

/// Durable order store: the single source of truth for order existence and
/// status.
#[derive(Clone)]
pub struct OrderLedger {
    db: Arc<DbPool>,
}

impl OrderLedger {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Persist a new order. The single-row insert is atomic: on error no
    /// partial order exists and the caller retries with a fresh id.
    #[instrument(skip(self, new_order), fields(order_id = %new_order.id))]
    pub async fn create(&self, new_order: NewOrder) -> Result<Order, ServiceError> {
        let now = Utc::now();

        let model = order::ActiveModel {
            id: Set(new_order.id),
            customer_id: Set(new_order.customer_id),
            status: Set(new_order.status),
            payment_status: Set(new_order.payment_status),
            payment_method: Set(new_order.payment_method),
            items: Set(encode_json(&new_order.items)?),
            shipping_address: Set(encode_json(&new_order.shipping_address)?),
            summary: Set(encode_json(&new_order.summary)?),
            gateway_order_id: Set(None),
            gateway_payment_id: Set(None),
            payment_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = model.insert(&*self.db).await.map_err(|e| {
            error!(error = %e, "failed to persist order");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %inserted.id, "order persisted");
        decode_order(inserted)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, order_id: &str) -> Result<Option<Order>, ServiceError> {
        let model = OrderEntity::find_by_id(order_id).one(&*self.db).await?;
        model.map(decode_order).transpose()
    }

    /// Merge-update an order row. Status moves are validated against the
    /// forward-only transition tables before anything is written.
    #[instrument(skip(self, patch), fields(order_id = %order_id))]
    pub async fn update(&self, order_id: &str, patch: OrderPatch) -> Result<Order, ServiceError> {
        let model = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if let Some(next) = patch.status {
            if next != model.status && !model.status.can_transition_to(next) {
                return Err(ServiceError::InvalidStatus(format!(
                    "order {} cannot move from {:?} to {:?}",
                    order_id, model.status, next
                )));
            }
        }
        if let Some(next) = patch.payment_status {
            if next != model.payment_status && !model.payment_status.can_transition_to(next) {
                return Err(ServiceError::InvalidStatus(format!(
                    "order {} payment cannot move from {:?} to {:?}",
                    order_id, model.payment_status, next
                )));
            }
        }

        let mut active: order::ActiveModel = model.into();
        if let Some(status) = patch.status {
            active.status = Set(status);
        }
        if let Some(payment_status) = patch.payment_status {
            active.payment_status = Set(payment_status);
        }
        if let Some(gateway_order_id) = patch.gateway_order_id {
            active.gateway_order_id = Set(Some(gateway_order_id));
        }
        if let Some(gateway_payment_id) = patch.gateway_payment_id {
            active.gateway_payment_id = Set(Some(gateway_payment_id));
        }
        if let Some(payment_error) = patch.payment_error {
            active.payment_error = Set(Some(payment_error));
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;
        decode_order(updated)
    }

    /// Orders for one customer, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListPage, ServiceError> {
        let paginator = OrderEntity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page.saturating_sub(1)).await?;

        let orders = models
            .into_iter()
            .map(decode_order)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OrderListPage {
            orders,
            total,
            page,
            per_page,
        })
    }
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, ServiceError> {
    serde_json::to_string(value).map_err(|e| ServiceError::SerializationError(e.to_string()))
}

/// Decode a stored row into the canonical [`Order`]. Tolerates the legacy
/// document shapes; anything unreadable is surfaced as a serialization error
/// rather than a silent default.
fn decode_order(model: order::Model) -> Result<Order, ServiceError> {
    let items: Vec<CartLine> = serde_json::from_str(&model.items)
        .map_err(|e| ServiceError::SerializationError(format!("order {} items: {}", model.id, e)))?;
    let shipping_address: AddressSnapshot =
        serde_json::from_str(&model.shipping_address).map_err(|e| {
            ServiceError::SerializationError(format!("order {} address: {}", model.id, e))
        })?;
    let summary_value: Value = serde_json::from_str(&model.summary).map_err(|e| {
        ServiceError::SerializationError(format!("order {} summary: {}", model.id, e))
    })?;
    let summary = decode_summary(&summary_value)
        .ok_or_else(|| ServiceError::SerializationError(format!("order {} summary shape", model.id)))?;

    Ok(Order {
        id: model.id,
        customer_id: model.customer_id,
        status: model.status,
        payment_status: model.payment_status,
        payment_method: model.payment_method,
        items,
        shipping_address,
        summary,
        gateway_order_id: model.gateway_order_id,
        gateway_payment_id: model.gateway_payment_id,
        payment_error: model.payment_error,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

/// Versioned summary decoder. Canonical documents carry the full breakdown;
/// older ones stored a bare total (top-level number, `total`, or
/// `totalAmount`/`total_amount`) and decode with the total attributed to the
/// subtotal.
fn decode_summary(value: &Value) -> Option<OrderSummary> {
    if let Some(total) = value.as_i64() {
        return Some(legacy_total(total));
    }

    let obj = value.as_object()?;

    if obj.contains_key("subtotal") {
        return Some(OrderSummary {
            subtotal: obj.get("subtotal").and_then(Value::as_i64)?,
            tax: obj.get("tax").and_then(Value::as_i64).unwrap_or(0),
            shipping: obj.get("shipping").and_then(Value::as_i64).unwrap_or(0),
            total: obj.get("total").and_then(Value::as_i64)?,
        });
    }

    let total = obj
        .get("total")
        .or_else(|| obj.get("totalAmount"))
        .or_else(|| obj.get("total_amount"))
        .and_then(Value::as_i64)?;
    Some(legacy_total(total))
}

fn legacy_total(total: i64) -> OrderSummary {
    OrderSummary {
        subtotal: total,
        tax: 0,
        shipping: 0,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_order_ids_carry_prefix_and_suffix() {
        let id = generate_order_id();
        assert!(id.starts_with("ORD-"));
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 6);
    }

    #[test]
    fn generated_order_ids_are_unique() {
        let a = generate_order_id();
        let b = generate_order_id();
        assert_ne!(a, b);
    }

    #[test]
    fn decode_summary_reads_canonical_shape() {
        let value = json!({"subtotal": 400, "tax": 72, "shipping": 50, "total": 522});
        assert_eq!(
            decode_summary(&value),
            Some(OrderSummary {
                subtotal: 400,
                tax: 72,
                shipping: 50,
                total: 522
            })
        );
    }

    #[test]
    fn decode_summary_coalesces_legacy_totals() {
        assert_eq!(decode_summary(&json!({"total": 522})), Some(legacy_total(522)));
        assert_eq!(
            decode_summary(&json!({"totalAmount": 708})),
            Some(legacy_total(708))
        );
        assert_eq!(
            decode_summary(&json!({"total_amount": 99})),
            Some(legacy_total(99))
        );
        assert_eq!(decode_summary(&json!(245)), Some(legacy_total(245)));
    }

    #[test]
    fn decode_summary_rejects_unreadable_shapes() {
        assert_eq!(decode_summary(&json!("not a summary")), None);
        assert_eq!(decode_summary(&json!({"grand": 10})), None);
    }

    #[test]
    fn decode_summary_canonical_tolerates_missing_components() {
        // Some early documents wrote subtotal/total without the breakdown.
        let value = json!({"subtotal": 500, "total": 500});
        assert_eq!(
            decode_summary(&value),
            Some(OrderSummary {
                subtotal: 500,
                tax: 0,
                shipping: 0,
                total: 500
            })
        );
    }
}

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::AppConfig;

/// One line of the cart snapshot. Product details are captured by value at
/// placement time; the catalog is never re-read. The serde aliases accept the
/// field names older stored documents used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    #[serde(alias = "productId")]
    pub product_id: String,
    pub name: String,
    #[serde(alias = "unitPrice", alias = "unit_price")]
    pub price: i64,
    #[serde(alias = "qty")]
    pub quantity: i64,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Derived pricing breakdown. All amounts are whole currency units and
/// `total == subtotal + tax + shipping` by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderSummary {
    pub subtotal: i64,
    pub tax: i64,
    pub shipping: i64,
    pub total: i64,
}

impl OrderSummary {
    pub const ZERO: OrderSummary = OrderSummary {
        subtotal: 0,
        tax: 0,
        shipping: 0,
        total: 0,
    };
}

/// Pure pricing calculator. Configured once; no side effects.
#[derive(Debug, Clone)]
pub struct PricingService {
    tax_rate: Decimal,
    free_shipping_threshold: i64,
    shipping_fee: i64,
}

impl PricingService {
    pub fn new(tax_rate: Decimal, free_shipping_threshold: i64, shipping_fee: i64) -> Self {
        Self {
            tax_rate,
            free_shipping_threshold,
            shipping_fee,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.tax_rate, cfg.free_shipping_threshold, cfg.shipping_fee)
    }

    /// Price a cart snapshot. An empty cart yields the all-zero breakdown.
    pub fn quote(&self, lines: &[CartLine]) -> OrderSummary {
        if lines.is_empty() {
            return OrderSummary::ZERO;
        }

        let subtotal: i64 = lines.iter().map(|line| line.price * line.quantity).sum();

        let tax = (Decimal::from(subtotal) * self.tax_rate)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(0);

        let shipping = if subtotal >= self.free_shipping_threshold {
            0
        } else {
            self.shipping_fee
        };

        OrderSummary {
            subtotal,
            tax,
            shipping,
            total: subtotal + tax + shipping,
        }
    }
}

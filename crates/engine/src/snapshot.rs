//! Read-side projections returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use souk_core::{CoreError, CoreResult, UserId};
use souk_orders::{Order, OrderId, OrderStatus};
use souk_products::{Product, ProductId, StockStatus};

/// Point-in-time view of an order, as returned by every coordinator operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub quantity: i64,
    pub total_amount: u64,
    pub product_id: ProductId,
    pub status_changed_at: DateTime<Utc>,
}

impl OrderSnapshot {
    pub fn from_order(order: &Order) -> CoreResult<Self> {
        let product_id = order
            .product_id()
            .ok_or_else(|| CoreError::storage("order stream missing placement event"))?;
        let status_changed_at = order
            .status_changed_at()
            .ok_or_else(|| CoreError::storage("order stream missing placement event"))?;

        Ok(Self {
            id: order.id_typed(),
            order_number: order.order_number().to_string(),
            status: order.status(),
            quantity: order.quantity(),
            total_amount: order.total_amount(),
            product_id,
            status_changed_at,
        })
    }
}

/// Point-in-time view of a product, including the derived stock figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub seller_id: UserId,
    pub stock_level: i64,
    pub baseline_stock: i64,
    pub stock_percentage: f64,
    pub stock_status: StockStatus,
    pub baseline_updated_at: DateTime<Utc>,
}

impl ProductSnapshot {
    pub fn from_product(product: &Product) -> CoreResult<Self> {
        let seller_id = product
            .seller_id()
            .ok_or_else(|| CoreError::storage("product stream missing creation event"))?;
        let baseline_updated_at = product
            .baseline_updated_at()
            .ok_or_else(|| CoreError::storage("product stream missing creation event"))?;

        Ok(Self {
            id: product.id_typed(),
            seller_id,
            stock_level: product.stock_level(),
            baseline_stock: product.baseline_stock(),
            stock_percentage: product.stock_percentage(),
            stock_status: product.stock_status(),
            baseline_updated_at,
        })
    }
}

/// Derived stock figures for display and alerting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockStatusReport {
    pub stock_level: i64,
    pub stock_percentage: f64,
    pub stock_status: StockStatus,
}

impl StockStatusReport {
    pub fn from_product(product: &Product) -> Self {
        Self {
            stock_level: product.stock_level(),
            stock_percentage: product.stock_percentage(),
            stock_status: product.stock_status(),
        }
    }
}

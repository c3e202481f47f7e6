//! Order domain types.

use chrono::{DateTime, Utc};

use localmart_core::{
    OrderId, OrderItemId, OrderStatus, PaymentIntentId, PaymentStatus, ProductId, SellerId,
    UserId,
};

/// A buyer's order (domain type).
///
/// Created by checkout. Payment confirmation moves it to `paid`/`processing`,
/// and seller attribution repair fills in a missing `seller_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Unique order ID.
    pub id: OrderId,
    /// Buyer who placed the order.
    pub buyer_id: Option<UserId>,
    /// Payment state.
    pub payment_status: PaymentStatus,
    /// Fulfillment state.
    pub status: OrderStatus,
    /// Gateway payment intent that paid for this order.
    pub payment_intent_id: Option<PaymentIntentId>,
    /// Seller responsible for fulfillment; `None` is a repairable inconsistency.
    pub seller_id: Option<SellerId>,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
    /// When the order was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether the order has been paid for.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

/// A line item of an order, used as evidence of who sells it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    /// Unique item ID.
    pub id: OrderItemId,
    /// Order this item belongs to.
    pub order_id: OrderId,
    /// Product purchased.
    pub product_id: ProductId,
    /// Insertion sequence; the lowest position is the order's first item.
    pub position: i64,
}

/// A product listing.
///
/// Every product is owned by a seller; a product row without one is corrupt
/// data and is reported as such by the repair job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Unique product ID.
    pub id: ProductId,
    /// Seller who owns the listing.
    pub seller_id: Option<SellerId>,
    /// Display name.
    pub name: String,
}

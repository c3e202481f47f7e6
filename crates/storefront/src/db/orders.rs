//! Order repository for database operations.
//!
//! Status columns are stored as text and parsed into domain enums on read; an
//! unknown value is reported as `RepositoryError::DataCorruption`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use localmart_core::{
    OrderId, OrderItemId, OrderStatus, PaymentIntentId, PaymentStatus, ProductId, SellerId,
    UserId,
};

use super::{MarkPaidOutcome, RepositoryError};
use crate::models::{Order, OrderItem};

/// Raw `orders` row.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    buyer_id: Option<UserId>,
    payment_status: String,
    status: String,
    payment_intent_id: Option<String>,
    seller_id: Option<SellerId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let payment_status = row.payment_status.parse::<PaymentStatus>().map_err(|e| {
            RepositoryError::DataCorruption(format!("order {}: {e}", row.id))
        })?;
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|e| RepositoryError::DataCorruption(format!("order {}: {e}", row.id)))?;

        Ok(Self {
            id: row.id,
            buyer_id: row.buyer_id,
            payment_status,
            status,
            payment_intent_id: row.payment_intent_id.and_then(PaymentIntentId::new),
            seller_id: row.seller_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Raw `order_items` row.
#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    position: i64,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            position: row.position,
        }
    }
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an order by its ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a status column is invalid.
    pub async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, buyer_id, payment_status, status,
                   payment_intent_id, seller_id, created_at, updated_at
            FROM orders
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    /// Mark an order as paid, guarded on it not already being paid.
    ///
    /// Sets `payment_status = 'paid'`, records the payment intent and moves the
    /// order to `processing` in a single conditional update. When no row is
    /// updated, the current row is read back to tell "already paid" apart from
    /// "no such order".
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either statement fails.
    pub async fn mark_paid(
        &self,
        id: OrderId,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<MarkPaidOutcome, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET payment_status = 'paid',
                payment_intent_id = $2,
                status = 'processing',
                updated_at = NOW()
            WHERE id = $1 AND payment_status <> 'paid'
            ",
        )
        .bind(id)
        .bind(payment_intent_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(MarkPaidOutcome::Updated);
        }

        let existing: Option<(Option<String>,)> =
            sqlx::query_as("SELECT payment_intent_id FROM orders WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        Ok(match existing {
            Some((intent,)) => MarkPaidOutcome::AlreadyPaid {
                payment_intent_id: intent.and_then(PaymentIntentId::new),
            },
            None => MarkPaidOutcome::NotFound,
        })
    }

    /// IDs of all orders with no seller attribution, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn missing_seller(&self) -> Result<Vec<OrderId>, RepositoryError> {
        let rows: Vec<(OrderId,)> = sqlx::query_as(
            r"
            SELECT id
            FROM orders
            WHERE seller_id IS NULL
            ORDER BY created_at, id
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Line items of an order, ordered by `position`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, product_id, position
            FROM order_items
            WHERE order_id = $1
            ORDER BY position
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    /// Attribute an order to a seller, only if it has none yet.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn assign_seller(
        &self,
        order_id: OrderId,
        seller_id: SellerId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET seller_id = $2, updated_at = NOW()
            WHERE id = $1 AND seller_id IS NULL
            ",
        )
        .bind(order_id)
        .bind(seller_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

//! Database operations for storefront `PostgreSQL`.
//!
//! # Database: `localmart`
//!
//! Holds the state of record for orders; the payment gateway owns payment
//! intents and customers, which are only referenced here by ID.
//!
//! ## Tables
//!
//! - `profiles` - Buyer profiles, caching the gateway customer ID
//! - `products` - Listings, each owned by a seller
//! - `orders` - Orders with payment state and seller attribution
//! - `order_items` - Line items (evidence for seller attribution)
//!
//! # Store seam
//!
//! Orchestration code talks to the database only through the [`OrderStore`]
//! and [`ProfileStore`] traits. [`PgStore`] is the production implementation;
//! tests substitute an in-memory store.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p localmart-cli -- migrate
//! ```

pub mod orders;
pub mod products;
pub mod profiles;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use localmart_core::{CustomerId, OrderId, PaymentIntentId, ProductId, SellerId, UserId};

pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use profiles::ProfileRepository;

use crate::models::{Order, OrderItem, Product, UserProfile};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Constraint violation (e.g., duplicate gateway customer).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Result of the guarded "mark as paid" transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkPaidOutcome {
    /// The order moved from unpaid/failed to paid.
    Updated,
    /// The order was already paid; nothing was written.
    AlreadyPaid {
        /// Intent recorded by the earlier confirmation.
        payment_intent_id: Option<PaymentIntentId>,
    },
    /// No order with that ID exists.
    NotFound,
}

/// Order, line item and product access used by payment orchestration.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Fetch an order by ID.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Mark an order paid by `payment_intent_id` and move it to `processing`,
    /// unless it is already paid.
    async fn mark_paid(
        &self,
        id: OrderId,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<MarkPaidOutcome, RepositoryError>;

    /// Snapshot of orders with no seller attribution, oldest first.
    async fn orders_missing_seller(&self) -> Result<Vec<OrderId>, RepositoryError>;

    /// Line items of an order, ordered by position.
    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError>;

    /// Fetch a product by ID.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Attribute an order to a seller if it still has none.
    ///
    /// Returns `false` when the order was attributed concurrently (or removed).
    async fn assign_seller(
        &self,
        order_id: OrderId,
        seller_id: SellerId,
    ) -> Result<bool, RepositoryError>;
}

/// Buyer profile access used by the payment method vault.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Gateway customer recorded for the user, if any.
    ///
    /// A missing profile row and a profile without a customer are both `None`;
    /// only genuine store failures are errors.
    async fn stripe_customer_id(&self, user_id: UserId)
    -> Result<Option<CustomerId>, RepositoryError>;

    /// Record the gateway customer for the user (upsert).
    ///
    /// The first recorded customer wins: if one is already stored, it is kept
    /// and returned in the profile instead of `customer_id`.
    async fn save_stripe_customer_id(
        &self,
        user_id: UserId,
        customer_id: &CustomerId,
    ) -> Result<UserProfile, RepositoryError>;
}

/// `PostgreSQL`-backed implementation of the store traits.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).get_by_id(id).await
    }

    async fn mark_paid(
        &self,
        id: OrderId,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<MarkPaidOutcome, RepositoryError> {
        OrderRepository::new(&self.pool)
            .mark_paid(id, payment_intent_id)
            .await
    }

    async fn orders_missing_seller(&self) -> Result<Vec<OrderId>, RepositoryError> {
        OrderRepository::new(&self.pool).missing_seller().await
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        OrderRepository::new(&self.pool).items(order_id).await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).get_by_id(id).await
    }

    async fn assign_seller(
        &self,
        order_id: OrderId,
        seller_id: SellerId,
    ) -> Result<bool, RepositoryError> {
        OrderRepository::new(&self.pool)
            .assign_seller(order_id, seller_id)
            .await
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn stripe_customer_id(
        &self,
        user_id: UserId,
    ) -> Result<Option<CustomerId>, RepositoryError> {
        ProfileRepository::new(&self.pool)
            .stripe_customer_id(user_id)
            .await
    }

    async fn save_stripe_customer_id(
        &self,
        user_id: UserId,
        customer_id: &CustomerId,
    ) -> Result<UserProfile, RepositoryError> {
        ProfileRepository::new(&self.pool)
            .upsert_stripe_customer_id(user_id, customer_id)
            .await
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

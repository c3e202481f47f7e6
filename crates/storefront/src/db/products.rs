//! Product repository for database operations.
//!
//! Products are read-only from the storefront's point of view; listings are
//! managed by sellers elsewhere.

use sqlx::PgPool;

use localmart_core::{ProductId, SellerId};

use super::RepositoryError;
use crate::models::Product;

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    seller_id: Option<SellerId>,
    name: String,
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a product by its ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, seller_id, name FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| Product {
            id: r.id,
            seller_id: r.seller_id,
            name: r.name,
        }))
    }
}

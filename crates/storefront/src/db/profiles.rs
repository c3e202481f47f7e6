//! Profile repository for database operations.
//!
//! Only the payment-related part of the profile (the cached gateway customer
//! ID) is handled here.

use sqlx::PgPool;

use localmart_core::{CustomerId, UserId};

use super::RepositoryError;
use crate::models::UserProfile;

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: UserId,
    stripe_customer_id: Option<String>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            stripe_customer_id: row.stripe_customer_id.and_then(CustomerId::new),
        }
    }
}

/// Customer recorded on a fetched profile; a missing profile has none.
fn recorded_customer(
    row: Result<ProfileRow, sqlx::Error>,
) -> Result<Option<CustomerId>, RepositoryError> {
    match row {
        Ok(row) => Ok(UserProfile::from(row).stripe_customer_id),
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(RepositoryError::Database(e)),
    }
}

/// Repository for profile database operations.
pub struct ProfileRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProfileRepository<'a> {
    /// Create a new profile repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Look up the gateway customer recorded for a user.
    ///
    /// `RowNotFound` is the expected "no profile yet" signal and maps to
    /// `Ok(None)`; every other database error is returned.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` for any failure other than a missing row.
    pub async fn stripe_customer_id(
        &self,
        user_id: UserId,
    ) -> Result<Option<CustomerId>, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, stripe_customer_id FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await;

        recorded_customer(row)
    }

    /// Record a gateway customer for a user, keeping any existing one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the customer is already linked to
    /// another user. Returns `RepositoryError::Database` for other errors.
    pub async fn upsert_stripe_customer_id(
        &self,
        user_id: UserId,
        customer_id: &CustomerId,
    ) -> Result<UserProfile, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r"
            INSERT INTO profiles (id, stripe_customer_id)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE
            SET stripe_customer_id = COALESCE(profiles.stripe_customer_id, EXCLUDED.stripe_customer_id),
                updated_at = NOW()
            RETURNING id, stripe_customer_id
            ",
        )
        .bind(user_id)
        .bind(customer_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict(format!(
                    "customer {customer_id} is linked to another profile"
                ));
            }
            RepositoryError::Database(e)
        })?;

        Ok(UserProfile::from(row))
    }
}
